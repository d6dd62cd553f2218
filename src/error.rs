//! Error kinds surfaced by the selection pipeline.
//!
//! Every failure travels as an [`anyhow::Error`] with context layers on top;
//! the kinds below sit at the bottom of that chain so callers can still tell
//! an empty result from a denied request or a broken connection.

use std::error::Error as StdError;

use aws_smithy_types::error::{display::DisplayErrorContext, metadata::ProvideErrorMetadata};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// An empty result where a non-empty one was required
    #[error("{0}")]
    NotFound(String),

    /// Authorization failure; the only trigger for MFA escalation
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// No running task and none was launched
    #[error("{0}")]
    NotRunning(String),

    /// A launched task did not reach the running state in time
    #[error("{0}")]
    Timeout(String),

    /// Any other API or network failure
    #[error("AWS request failed: {0}")]
    Transport(String),

    /// The operator aborted a prompt
    #[error("{0}")]
    UserCancelled(String),
}

impl Error {
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Error::AccessDenied(_))
    }
}

/// Error codes AWS services use for authorization failures
const ACCESS_DENIED_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "UnauthorizedOperation",
];

/// Classify an AWS error by its code, falling back to the message for
/// denials that arrive without one of the known codes (credential providers
/// report AssumeRole failures as plain text).
pub fn classify(code: Option<&str>, message: String) -> Error {
    match code {
        Some(c) if ACCESS_DENIED_CODES.contains(&c) => Error::AccessDenied(message),
        _ if message.contains("AccessDenied") || message.contains("explicit deny") => {
            Error::AccessDenied(message)
        }
        _ => Error::Transport(message),
    }
}

/// Convert an SDK operation error into a pipeline error kind.
pub fn from_sdk<E>(err: E) -> Error
where
    E: ProvideErrorMetadata + StdError + 'static,
{
    let code = err.code().map(str::to_string);
    let message = match err.message() {
        Some(message) => message.to_string(),
        None => DisplayErrorContext(&err).to_string(),
    };
    classify(code.as_deref(), message)
}

/// Find the pipeline error kind carried by `err`, looking through context layers.
pub fn kind(err: &anyhow::Error) -> Option<&Error> {
    err.downcast_ref::<Error>()
}

pub fn is_access_denied(err: &anyhow::Error) -> bool {
    kind(err).is_some_and(Error::is_access_denied)
}
