//! Typed error variants for managed-file operations.
//!
//! This module provides [`ResourceError`], a structured error type for the
//! backup, patch and regenerate primitives.  Callers convert to
//! [`anyhow::Error`] via `?`, or wrap it in
//! [`HardeningError`](crate::error::HardeningError).

use std::path::PathBuf;

use thiserror::Error;

/// Errors that arise while protecting or rewriting a managed file.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The current content of a target file could not be read.
    #[error("cannot read {}: {source}", .path.display())]
    ReadFailure {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A pre-existing file could not be snapshotted, so it must not be
    /// overwritten.
    #[error("backup of {} failed: {reason}", .path.display())]
    BackupFailure {
        /// File that was to be protected.
        path: PathBuf,
        /// Human-readable cause.
        reason: String,
    },

    /// Writing a patched directive file failed.
    #[error("cannot write patched {}: {source}", .path.display())]
    PatchWriteFailure {
        /// Target file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Writing a regenerated file failed.
    #[error("cannot write generated {}: {source}", .path.display())]
    GenerateWriteFailure {
        /// Target file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl ResourceError {
    /// The file this error concerns.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::ReadFailure { path, .. }
            | Self::BackupFailure { path, .. }
            | Self::PatchWriteFailure { path, .. }
            | Self::GenerateWriteFailure { path, .. } => path,
        }
    }
}
