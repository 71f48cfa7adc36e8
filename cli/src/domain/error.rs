//! Typed domain error enums.
//!
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator. Callers that need to classify a failure recover the
//! typed value with `anyhow::Error::downcast_ref`.

use std::path::PathBuf;

use thiserror::Error;

// ── Deployment errors ─────────────────────────────────────────────────────────

/// The failure taxonomy every deployment step reports through.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Bad or missing operator input. Fatal; carries a remediation hint.
    #[error("configuration error: {message}\n\nhint: {hint}")]
    Configuration { message: String, hint: String },

    /// An external process exited non-zero.
    #[error("command failed (exit {code}): {command}\n{stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    /// An external process exceeded its timeout and was killed.
    #[error("command timed out after {secs}s: {command}")]
    CommandTimedOut { command: String, secs: u64 },

    /// Vault, git remote, or cluster could not be reached. Never retried.
    #[error("{backend} is unavailable: {reason}\n\nhint: fix connectivity and re-run with --resume")]
    BackendUnavailable { backend: String, reason: String },

    /// The state file exists but cannot be trusted.
    #[error(
        "state file {} is corrupt: {reason}\n\nhint: repair the JSON by hand or delete the file to start over",
        path.display()
    )]
    StateCorruption { path: PathBuf, reason: String },
}

impl DeployError {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            hint: hint.into(),
        }
    }

    /// Stable machine-readable code for JSON output.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::CommandFailed { .. } => "command_failed",
            Self::CommandTimedOut { .. } => "command_timed_out",
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::StateCorruption { .. } => "state_corruption",
        }
    }

    /// The offending command line, when the failure came from a process.
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        match self {
            Self::CommandFailed { command, .. } | Self::CommandTimedOut { command, .. } => {
                Some(command)
            }
            _ => None,
        }
    }
}

/// Find the first `DeployError` in an error chain.
#[must_use]
pub fn classify(err: &anyhow::Error) -> Option<&DeployError> {
    err.chain().find_map(|e| e.downcast_ref::<DeployError>())
}
