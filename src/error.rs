//! Domain-specific error types for the hardening engine.
//!
//! Internal modules return typed errors built with [`thiserror`]; the command
//! handlers at the CLI boundary convert them to [`anyhow::Error`] via `?`.
//!
//! # Error hierarchy
//!
//! ```text
//! HardeningError
//! ├── Config(ConfigLoadError)        : override document unreadable or malformed
//! ├── Resource(ResourceError)        : backup, patch or generate failures
//! ├── Command(CommandError)          : external command failed or timed out
//! └── Verification(VerificationFailure): post-apply check reported failure
//! ```

use std::path::PathBuf;

use thiserror::Error;

pub use crate::resources::error::ResourceError;

/// Top-level error type for the hardening engine.
#[derive(Error, Debug)]
pub enum HardeningError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigLoadError),

    /// A managed file could not be protected or written.
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    /// An external command failed.
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    /// A post-apply check failed.
    #[error("Verification error: {0}")]
    Verification(#[from] VerificationFailure),

    /// The run was interrupted by the user.
    #[error("operation cancelled")]
    Cancelled,
}

/// Errors that arise while loading the desired-state override document.
///
/// Only [`ConfigLoadError::Unreadable`] is surfaced to callers of
/// [`ResolvedConfig::resolve`](crate::config::ResolvedConfig::resolve); the
/// other variants are logged as warnings and the defaults are used instead.
#[derive(Error, Debug)]
pub enum ConfigLoadError {
    /// The file exists but could not be read (e.g. permission denied).
    #[error("cannot read config file {}: {source}", .path.display())]
    Unreadable {
        /// Path to the override document.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid JSON.
    #[error("invalid JSON in {}: {source}", .path.display())]
    Malformed {
        /// Path to the override document.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_json::Error,
    },

    /// The file is valid JSON but its top level is not an object.
    #[error("config file {} must contain a JSON object at the top level", .path.display())]
    NotAnObject {
        /// Path to the override document.
        path: PathBuf,
    },

    /// A section of the merged document has the wrong shape.
    #[error("invalid '{section}' section: {source}")]
    InvalidSection {
        /// Name of the offending section.
        section: String,
        /// Underlying deserialization error.
        source: serde_json::Error,
    },
}

/// Errors returned by the command gateway.
#[derive(Error, Debug)]
pub enum CommandError {
    /// The process could not be started at all.
    #[error("failed to execute '{command}': {source}")]
    Spawn {
        /// Rendered command line.
        command: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The process ran but exited non-zero.
    #[error("'{command}' failed (exit {}): {}", display_code(.exit_code), .stderr.trim())]
    Failed {
        /// Rendered command line.
        command: String,
        /// Exit code, or `None` if the process was killed by a signal.
        exit_code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// The process did not finish within its timeout and was killed.
    #[error("'{command}' timed out after {timeout_secs}s")]
    TimedOut {
        /// Rendered command line.
        command: String,
        /// Timeout that elapsed.
        timeout_secs: u64,
    },
}

// thiserror hands fields to format arguments by reference.
#[allow(clippy::ref_option)]
fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}

/// A post-apply check reported failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{check}: {detail}")]
pub struct VerificationFailure {
    /// What was being verified (e.g. `"sshd -t"`).
    pub check: String,
    /// Captured diagnostic output.
    pub detail: String,
}

impl VerificationFailure {
    /// Create a new verification failure.
    #[must_use]
    pub fn new(check: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            check: check.into(),
            detail: detail.into(),
        }
    }
}
