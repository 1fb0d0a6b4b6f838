//! Idempotent file primitives (check + apply pattern).
//!
//! Each managed file is rendered in memory first (patched or regenerated),
//! compared with what is on disk, then backed up and written only when it
//! differs.
pub mod audit_rules;
pub mod backup;
pub mod directive;
pub mod error;
pub mod file;
pub mod fs;
pub mod rsyslog;
pub mod sysctl;

use crate::logging::Log;
use backup::BackupManager;
use error::ResourceError;

/// State of a managed file relative to its desired content.
///
/// # Examples
///
/// ```
/// use hardening_engine::resources::ResourceState;
///
/// let missing = ResourceState::Missing;
/// let correct = ResourceState::Correct;
/// let wrong = ResourceState::Incorrect { differing_lines: 2 };
///
/// assert_ne!(missing, correct);
/// assert_ne!(wrong, correct);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceState {
    /// The file does not exist.
    Missing,
    /// The file already holds the desired content.
    Correct,
    /// The file exists with different content.
    Incorrect {
        /// Number of line positions whose content differs.
        differing_lines: usize,
    },
}

/// Result of applying a resource change.
///
/// # Examples
///
/// ```
/// use hardening_engine::resources::ResourceChange;
///
/// let applied = ResourceChange::Applied;
/// let noop = ResourceChange::AlreadyCorrect;
///
/// assert_ne!(applied, noop);
/// assert_ne!(applied, ResourceChange::DryRun);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceChange {
    /// The file was created or updated.
    Applied,
    /// The file already held the desired content (no backup, no write).
    AlreadyCorrect,
    /// The change was simulated.
    DryRun,
}

/// A managed file that can be checked and brought to its desired state.
pub trait Resource {
    /// Human-readable description of this resource.
    fn description(&self) -> String;

    /// Check the current state of the resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the current state cannot be determined.
    fn current_state(&self) -> Result<ResourceState, ResourceError>;

    /// Bring the resource to its desired state.
    ///
    /// Implementations must call [`BackupManager::ensure_backup`] before the
    /// first mutation and must not mutate anything when `dry_run` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup fails or the write fails.
    fn apply(
        &self,
        backups: &mut BackupManager,
        dry_run: bool,
        log: &dyn Log,
    ) -> Result<ResourceChange, ResourceError>;
}
