//! Interactive terminal prompts.

use std::io;

use anyhow::Result;
use dialoguer::{Confirm, Input, Select, theme::ColorfulTheme};

use crate::error::Error;

/// The three kinds of question the pipeline asks the operator.
///
/// Aborting any prompt (Esc, `q`, Ctrl-C) yields [`Error::UserCancelled`].
#[cfg_attr(test, mockall::automock)]
pub trait Prompter {
    /// Present `items` under `label` and return the index of the chosen one.
    fn select(&self, label: &str, items: &[String]) -> Result<usize>;

    /// Ask a yes/no question.
    fn confirm(&self, label: &str) -> Result<bool>;

    /// Read a line of free text.
    fn input(&self, label: &str) -> Result<String>;
}

#[derive(Default)]
pub struct TerminalPrompter {
    theme: ColorfulTheme,
}

impl Prompter for TerminalPrompter {
    fn select(&self, label: &str, items: &[String]) -> Result<usize> {
        let answer = Select::with_theme(&self.theme)
            .with_prompt(label)
            .items(items)
            .default(0)
            .interact_opt()
            .map_err(|e| interrupted(label, e))?;
        answered(label, answer)
    }

    fn confirm(&self, label: &str) -> Result<bool> {
        let answer = Confirm::with_theme(&self.theme)
            .with_prompt(label)
            .default(false)
            .interact_opt()
            .map_err(|e| interrupted(label, e))?;
        answered(label, answer)
    }

    fn input(&self, label: &str) -> Result<String> {
        let value: String = Input::with_theme(&self.theme)
            .with_prompt(label)
            .allow_empty(true)
            .interact_text()
            .map_err(|e| interrupted(label, e))?;
        Ok(value.trim().to_string())
    }
}

fn answered<T>(label: &str, answer: Option<T>) -> Result<T> {
    answer.ok_or_else(|| Error::UserCancelled(format!("{label}: prompt aborted")).into())
}

/// Ctrl-C surfaces as an interrupted read; everything else is a terminal failure.
fn interrupted(label: &str, err: dialoguer::Error) -> anyhow::Error {
    match err {
        dialoguer::Error::IO(e) if e.kind() == io::ErrorKind::Interrupted => {
            Error::UserCancelled(format!("{label}: prompt interrupted")).into()
        }
        other => anyhow::Error::from(other).context(format!("{label}: prompt failed")),
    }
}
