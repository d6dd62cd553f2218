//! AWS config file scanning.
//!
//! `~/.aws/config` names its sections `[profile <name>]` (plus a bare
//! `[default]`), so it is read with a small line-oriented state machine that
//! keeps declaration order. The credentials file uses flat `[<name>]`
//! sections and is only consulted as a fallback for `mfa_serial`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use aws_config::profile::profile_file::{ProfileFileKind, ProfileFiles};
use configparser::ini::Ini;
use log::debug;
use tokio::fs;

use crate::error::Error;

const MFA_SERIAL: &str = "mfa_serial";
const SOURCE_PROFILE: &str = "source_profile";

/// Where the shared AWS config and credentials files live.
#[derive(Debug, Clone)]
pub struct ConfigFiles {
    config: PathBuf,
    credentials: PathBuf,
}

/// MFA-related settings of one profile. Either field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MfaSettings {
    pub mfa_serial: Option<String>,
    pub source_profile: Option<String>,
}

impl ConfigFiles {
    pub fn new(config: PathBuf, credentials: PathBuf) -> Self {
        Self { config, credentials }
    }

    /// Resolve both paths, defaulting to `~/.aws/config` and `~/.aws/credentials`.
    pub fn resolve(config: Option<PathBuf>, credentials: Option<PathBuf>) -> Result<Self> {
        let aws_dir = || dirs::home_dir().map(|d| d.join(".aws"));
        let config = config
            .or_else(|| aws_dir().map(|d| d.join("config")))
            .context("Could not determine home directory")?;
        let credentials = credentials
            .or_else(|| aws_dir().map(|d| d.join("credentials")))
            .context("Could not determine home directory")?;
        Ok(Self::new(config, credentials))
    }

    /// The same two files, for the SDK's profile and region resolution.
    pub fn profile_files(&self) -> ProfileFiles {
        ProfileFiles::builder()
            .with_file(ProfileFileKind::Config, &self.config)
            .with_file(ProfileFileKind::Credentials, &self.credentials)
            .build()
    }

    /// Profile names declared in the config file, in file order.
    pub async fn profiles(&self) -> Result<Vec<String>> {
        let content = fs::read_to_string(&self.config).await.map_err(|e| {
            Error::NotFound(format!(
                "failed to read AWS config {}: {e}",
                self.config.display()
            ))
        })?;

        let profiles = list_profiles(&content);
        if profiles.is_empty() {
            return Err(Error::NotFound("no AWS profiles found".to_string()).into());
        }
        Ok(profiles)
    }

    /// MFA serial and source profile for `profile`.
    ///
    /// Unreadable files count as empty: escalation can still discover a
    /// device through IAM or ask the operator for one.
    pub async fn mfa_settings(&self, profile: &str) -> MfaSettings {
        let mut settings = match read_optional(&self.config).await {
            Some(content) => profile_settings(&content, profile),
            None => MfaSettings::default(),
        };

        if settings.mfa_serial.is_none() {
            settings.mfa_serial = self.credentials_mfa_serial(profile).await;
        }
        settings
    }

    async fn credentials_mfa_serial(&self, profile: &str) -> Option<String> {
        let content = read_optional(&self.credentials).await?;
        let mut ini = Ini::new_cs();
        if let Err(e) = ini.read(content) {
            debug!("Ignoring unparsable {}: {e}", self.credentials.display());
            return None;
        }
        ini.get(profile, MFA_SERIAL).filter(|serial| !serial.is_empty())
    }
}

async fn read_optional(path: &Path) -> Option<String> {
    match fs::read_to_string(path).await {
        Ok(content) => Some(content),
        Err(e) => {
            debug!("Skipping {}: {e}", path.display());
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    OutsideSection,
    InTargetSection,
    InOtherSection,
}

/// One classified line of a config file.
#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    /// A `[`-prefixed line; `Some` carries the profile name it declares.
    Header(Option<&'a str>),
    Entry(&'a str, &'a str),
    Blank,
}

fn classify_line(raw: &str) -> Line<'_> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
        return Line::Blank;
    }
    if line.starts_with('[') {
        let name = line
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .and_then(config_profile_name);
        return Line::Header(name);
    }
    match line.split_once('=') {
        Some((key, value)) => Line::Entry(key.trim(), value.trim()),
        None => Line::Blank,
    }
}

/// `profile <name>` declares `<name>`, `default` declares `default`.
fn config_profile_name(section: &str) -> Option<&str> {
    let section = section.trim();
    if section == "default" {
        return Some("default");
    }
    section
        .strip_prefix("profile ")
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

fn list_profiles(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| match classify_line(line) {
            Line::Header(name) => name.map(str::to_string),
            _ => None,
        })
        .collect()
}

fn profile_settings(content: &str, profile: &str) -> MfaSettings {
    let mut state = ScanState::OutsideSection;
    let mut settings = MfaSettings::default();

    for line in content.lines() {
        state = match (state, classify_line(line)) {
            (ScanState::InTargetSection, Line::Header(_)) => break,
            (_, Line::Header(Some(name))) if name == profile => ScanState::InTargetSection,
            (_, Line::Header(_)) => ScanState::InOtherSection,
            (ScanState::InTargetSection, Line::Entry(key, value)) => {
                let value = (!value.is_empty()).then(|| value.to_string());
                match key {
                    MFA_SERIAL => settings.mfa_serial = value,
                    SOURCE_PROFILE => settings.source_profile = value,
                    _ => {}
                }
                ScanState::InTargetSection
            }
            (state, _) => state,
        };
    }
    settings
}
