//! Once-per-run snapshots of files before their first mutation.
//!
//! [`BackupManager`] owns the run's rollback registry. Every component that
//! is about to overwrite a file calls [`BackupManager::ensure_backup`] first
//! and treats [`BackupOutcome::Failed`] as fatal for that file.
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::logging::Log;
use crate::resources::error::ResourceError;

/// `strftime` pattern used in backup file names.
pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// A recorded copy of a file taken before it was first mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSnapshot {
    /// The file that was protected.
    pub original: PathBuf,
    /// Where its pre-mutation content was copied.
    pub backup: PathBuf,
    /// Local time the copy was taken (ISO 8601).
    pub timestamp: String,
}

/// Why [`BackupManager::ensure_backup`] did not copy anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Dry-run mode: the intended backup was only logged.
    DryRun,
    /// Backups are disabled in configuration.
    Disabled,
    /// The file does not exist, so there is nothing to protect.
    NotFound,
    /// The file was already snapshotted earlier in this run.
    AlreadyBackedUp,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DryRun => "dry run",
            Self::Disabled => "backups disabled",
            Self::NotFound => "file does not exist",
            Self::AlreadyBackedUp => "already backed up in this run",
        })
    }
}

/// Result of [`BackupManager::ensure_backup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// No copy was needed.
    Skipped(SkipReason),
    /// A copy was made and recorded in the rollback registry.
    Created(FileSnapshot),
    /// The file exists but could not be copied.
    Failed {
        /// File that was to be protected.
        path: PathBuf,
        /// Human-readable cause.
        reason: String,
    },
}

impl BackupOutcome {
    /// Convert [`Failed`](Self::Failed) into [`ResourceError::BackupFailure`].
    ///
    /// Callers use this to make an unprotected overwrite impossible:
    ///
    /// ```ignore
    /// backups.ensure_backup(path, log).require()?;
    /// write(path, content)?;
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::BackupFailure`] for a failed backup.
    pub fn require(self) -> Result<Option<FileSnapshot>, ResourceError> {
        match self {
            Self::Skipped(_) => Ok(None),
            Self::Created(snapshot) => Ok(Some(snapshot)),
            Self::Failed { path, reason } => Err(ResourceError::BackupFailure { path, reason }),
        }
    }
}

/// Takes at most one backup per path per run and keeps the rollback registry.
#[derive(Debug)]
pub struct BackupManager {
    backup_dir: PathBuf,
    enabled: bool,
    dry_run: bool,
    protected: HashSet<PathBuf>,
    registry: Vec<FileSnapshot>,
}

impl BackupManager {
    /// Create a manager writing into `backup_dir`.
    #[must_use]
    pub fn new(backup_dir: impl Into<PathBuf>, enabled: bool, dry_run: bool) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            enabled,
            dry_run,
            protected: HashSet::new(),
            registry: Vec::new(),
        }
    }

    /// Snapshots taken so far in this run, in order.
    #[must_use]
    pub fn registry(&self) -> &[FileSnapshot] {
        &self.registry
    }

    /// Protect `path` before its first mutation in this run.
    ///
    /// Checks, in order: dry-run, backups disabled, already protected,
    /// file absent. Only then is the file copied to
    /// `<backup_dir>/<basename>.<YYYYMMDD_HHMMSS>.bak`.
    pub fn ensure_backup(&mut self, path: &Path, log: &dyn Log) -> BackupOutcome {
        let now = chrono::Local::now();
        let stamp = now.format(BACKUP_TIMESTAMP_FORMAT).to_string();

        if self.dry_run {
            let name = path
                .file_name()
                .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
            log.dry_run(&format!(
                "would back up {} to {}",
                path.display(),
                self.backup_dir.join(format!("{name}.{stamp}.bak")).display()
            ));
            return BackupOutcome::Skipped(SkipReason::DryRun);
        }
        if !self.enabled {
            log.debug(&format!("backup of {} not required: disabled", path.display()));
            return BackupOutcome::Skipped(SkipReason::Disabled);
        }
        if self.protected.contains(path) {
            return BackupOutcome::Skipped(SkipReason::AlreadyBackedUp);
        }
        if !path.exists() {
            log.debug(&format!(
                "backup of {} not required: file does not exist",
                path.display()
            ));
            return BackupOutcome::Skipped(SkipReason::NotFound);
        }

        let fail = |reason: String| {
            log.error(&format!("backup of {} failed: {reason}", path.display()));
            BackupOutcome::Failed {
                path: path.to_path_buf(),
                reason,
            }
        };

        let Some(name) = path.file_name() else {
            return fail("path has no file name".to_string());
        };
        if let Err(e) = std::fs::create_dir_all(&self.backup_dir) {
            return fail(format!(
                "cannot create {}: {e}",
                self.backup_dir.display()
            ));
        }
        let backup = unique_backup_path(&self.backup_dir, &name.to_string_lossy(), &stamp);
        if let Err(e) = std::fs::copy(path, &backup) {
            return fail(e.to_string());
        }

        let snapshot = FileSnapshot {
            original: path.to_path_buf(),
            backup,
            timestamp: now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
        };
        log.info(&format!(
            "backed up {} to {}",
            path.display(),
            snapshot.backup.display()
        ));
        self.protected.insert(path.to_path_buf());
        self.registry.push(snapshot.clone());
        BackupOutcome::Created(snapshot)
    }
}

/// `<dir>/<name>.<stamp>.bak`, or `<name>.<stamp>.<n>.bak` if taken.
fn unique_backup_path(dir: &Path, name: &str, stamp: &str) -> PathBuf {
    let candidate = dir.join(format!("{name}.{stamp}.bak"));
    if !candidate.exists() {
        return candidate;
    }
    (1u32..)
        .map(|n| dir.join(format!("{name}.{stamp}.{n}.bak")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::logging::BufferedLog;

    struct Fixture {
        _dir: tempfile::TempDir,
        target: PathBuf,
        backups: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("sshd_config");
        std::fs::write(&target, "PermitRootLogin yes\n").unwrap();
        let backups = dir.path().join("backups");
        Fixture {
            target,
            backups,
            _dir: dir,
        }
    }

    fn bak_files(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .map(|rd| rd.map(|e| e.unwrap().path()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn creates_timestamped_copy() {
        let fx = fixture();
        let mut manager = BackupManager::new(&fx.backups, true, false);
        let log = BufferedLog::new();

        let outcome = manager.ensure_backup(&fx.target, &log);

        let BackupOutcome::Created(snapshot) = outcome else {
            panic!("expected Created, got {outcome:?}");
        };
        assert_eq!(snapshot.original, fx.target);
        let name = snapshot.backup.file_name().unwrap().to_string_lossy().into_owned();
        let stamp = name
            .strip_prefix("sshd_config.")
            .and_then(|s| s.strip_suffix(".bak"))
            .unwrap();
        assert_eq!(stamp.len(), 15, "YYYYMMDD_HHMMSS: {stamp}");
        assert_eq!(stamp.as_bytes()[8], b'_');
        assert_eq!(
            std::fs::read_to_string(&snapshot.backup).unwrap(),
            "PermitRootLogin yes\n"
        );
        assert_eq!(manager.registry(), [snapshot]);
    }

    #[test]
    fn second_call_for_same_path_is_noop() {
        let fx = fixture();
        let mut manager = BackupManager::new(&fx.backups, true, false);
        let log = BufferedLog::new();

        assert!(matches!(
            manager.ensure_backup(&fx.target, &log),
            BackupOutcome::Created(_)
        ));
        std::fs::write(&fx.target, "PermitRootLogin no\n").unwrap();
        assert_eq!(
            manager.ensure_backup(&fx.target, &log),
            BackupOutcome::Skipped(SkipReason::AlreadyBackedUp)
        );

        assert_eq!(manager.registry().len(), 1);
        assert_eq!(bak_files(&fx.backups).len(), 1);
        assert_eq!(
            std::fs::read_to_string(&manager.registry()[0].backup).unwrap(),
            "PermitRootLogin yes\n",
            "the snapshot holds the pre-mutation content"
        );
    }

    #[test]
    fn missing_path_is_skipped_and_not_recorded() {
        let fx = fixture();
        let mut manager = BackupManager::new(&fx.backups, true, false);
        let log = BufferedLog::new();

        let outcome = manager.ensure_backup(&fx.backups.join("absent.conf"), &log);

        assert_eq!(outcome, BackupOutcome::Skipped(SkipReason::NotFound));
        assert!(manager.registry().is_empty());
        assert!(!fx.backups.exists());
    }

    #[test]
    fn disabled_is_skipped() {
        let fx = fixture();
        let mut manager = BackupManager::new(&fx.backups, false, false);
        let outcome = manager.ensure_backup(&fx.target, &BufferedLog::new());
        assert_eq!(outcome, BackupOutcome::Skipped(SkipReason::Disabled));
        assert!(!fx.backups.exists());
    }

    #[test]
    fn dry_run_logs_intended_path_without_io() {
        let fx = fixture();
        let mut manager = BackupManager::new(&fx.backups, true, true);
        let log = BufferedLog::new();

        let outcome = manager.ensure_backup(&fx.target, &log);

        assert_eq!(outcome, BackupOutcome::Skipped(SkipReason::DryRun));
        assert!(!fx.backups.exists());
        assert!(manager.registry().is_empty());
        let messages = log.dry_run_messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("sshd_config."), "{}", messages[0]);
        assert!(messages[0].ends_with(".bak"), "{}", messages[0]);
    }

    #[test]
    fn unwritable_backup_dir_fails() {
        let fx = fixture();
        // A regular file where the backup directory should be.
        let blocker = fx.backups.with_file_name("blocker");
        std::fs::write(&blocker, "").unwrap();
        let mut manager = BackupManager::new(blocker.join("sub"), true, false);
        let log = BufferedLog::new();

        let outcome = manager.ensure_backup(&fx.target, &log);

        assert!(matches!(outcome, BackupOutcome::Failed { .. }), "{outcome:?}");
        assert!(manager.registry().is_empty());
        assert!(log.contains("backup of"));
        let err = outcome.require().unwrap_err();
        assert!(matches!(err, ResourceError::BackupFailure { .. }));
    }

    #[test]
    fn require_passes_through_non_failures() {
        assert_eq!(
            BackupOutcome::Skipped(SkipReason::NotFound).require().unwrap(),
            None
        );
    }

    #[test]
    fn name_collision_gets_counter_suffix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.conf.20260101_000000.bak"), "").unwrap();
        let path = unique_backup_path(dir.path(), "a.conf", "20260101_000000");
        assert_eq!(path, dir.path().join("a.conf.20260101_000000.1.bak"));
    }

    #[test]
    fn distinct_paths_with_same_basename_both_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a").join("rules.conf");
        let b = dir.path().join("b").join("rules.conf");
        for p in [&a, &b] {
            std::fs::create_dir_all(p.parent().unwrap()).unwrap();
            std::fs::write(p, "x").unwrap();
        }
        let mut manager = BackupManager::new(dir.path().join("bk"), true, false);
        let log = BufferedLog::new();
        manager.ensure_backup(&a, &log);
        manager.ensure_backup(&b, &log);

        assert_eq!(manager.registry().len(), 2);
        assert_ne!(manager.registry()[0].backup, manager.registry()[1].backup);
    }

    #[test]
    fn snapshot_serializes_rollback_fields() {
        let snapshot = FileSnapshot {
            original: PathBuf::from("/etc/ssh/sshd_config"),
            backup: PathBuf::from("/var/backups/hardening_tool/sshd_config.20260101_000000.bak"),
            timestamp: "2026-01-01T00:00:00.000000".to_string(),
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["original"], "/etc/ssh/sshd_config");
        assert_eq!(
            json["backup"],
            "/var/backups/hardening_tool/sshd_config.20260101_000000.bak"
        );
        assert_eq!(json["timestamp"], "2026-01-01T00:00:00.000000");
    }
}
