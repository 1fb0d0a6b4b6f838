use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::ResolvedConfig;
use crate::exec::{CommandGateway, Executor};
use crate::logging::Log;
use crate::resources::backup::BackupManager;

/// Shared state for one run, threaded through every task.
pub struct Context {
    /// Resolved configuration, read-only for the whole run.
    pub config: Arc<ResolvedConfig>,
    /// Logger for output.
    pub log: Arc<dyn Log>,
    /// Dry-run aware command front door.
    pub commands: CommandGateway,
    /// Run-wide backup registry; every step shares it.
    pub backups: BackupManager,
    /// Set by the Ctrl-C handler; checked between tasks.
    pub cancelled: Arc<AtomicBool>,
    /// Files changed (or, in dry-run, that would change) so far this run.
    modified: HashSet<PathBuf>,
    /// Files a daemon accepted (or, in dry-run, would be asked to) this run.
    validated: HashSet<PathBuf>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("config", &"<ResolvedConfig>")
            .field("log", &"<dyn Log>")
            .field("commands", &self.commands)
            .field("backups", &self.backups)
            .field("cancelled", &self.cancelled)
            .field("modified", &self.modified)
            .field("validated", &self.validated)
            .finish()
    }
}

impl Context {
    /// Create a context for a run.
    ///
    /// The gateway and backup manager both take their dry-run switch from
    /// `config`, so a single flag governs every mutation.
    #[must_use]
    pub fn new(config: Arc<ResolvedConfig>, log: Arc<dyn Log>, executor: Arc<dyn Executor>) -> Self {
        let dry_run = config.dry_run();
        let backups = BackupManager::new(
            config.general.backup_dir.clone(),
            config.backups_enabled(),
            dry_run,
        );
        Self {
            commands: CommandGateway::new(executor, dry_run),
            backups,
            config,
            log,
            cancelled: Arc::new(AtomicBool::new(false)),
            modified: HashSet::new(),
            validated: HashSet::new(),
        }
    }

    /// Replace the cancellation flag with one shared with a signal handler.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancelled = flag;
        self
    }

    /// Whether mutations are simulated.
    #[must_use]
    pub fn dry_run(&self) -> bool {
        self.config.dry_run()
    }

    /// Whether the user asked to stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Note that `path` was changed by this run.
    pub fn mark_modified(&mut self, path: &Path) {
        self.modified.insert(path.to_path_buf());
    }

    /// Whether `path` was changed by this run.
    #[must_use]
    pub fn was_modified(&self, path: &Path) -> bool {
        self.modified.contains(path)
    }

    /// Note that the daemon reading `path` accepted its current content.
    pub fn mark_validated(&mut self, path: &Path) {
        self.validated.insert(path.to_path_buf());
    }

    /// Whether `path` passed its daemon's syntax check this run.
    #[must_use]
    pub fn was_validated(&self, path: &Path) -> bool {
        self.validated.contains(path)
    }
}
