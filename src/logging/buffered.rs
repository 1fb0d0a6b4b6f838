//! In-memory logger that keeps every entry for later inspection.
use std::sync::Mutex;

use super::types::Log;
use super::{DRY_RUN_TARGET, STAGE_TARGET};

/// A single recorded log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    /// A stage header entry.
    Stage(String),
    /// An informational entry.
    Info(String),
    /// A debug entry.
    Debug(String),
    /// A warning entry.
    Warn(String),
    /// An error entry.
    Error(String),
    /// A dry-run entry.
    DryRun(String),
}

impl LogEntry {
    /// The message text regardless of level.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Stage(m)
            | Self::Info(m)
            | Self::Debug(m)
            | Self::Warn(m)
            | Self::Error(m)
            | Self::DryRun(m) => m,
        }
    }

    /// Forward this entry to the tracing pipeline.
    fn emit(&self) {
        match self {
            Self::Stage(msg) => tracing::info!(target: STAGE_TARGET, "{msg}"),
            Self::Info(msg) => tracing::info!("{msg}"),
            Self::Debug(msg) => tracing::debug!("{msg}"),
            Self::Warn(msg) => tracing::warn!("{msg}"),
            Self::Error(msg) => tracing::error!("{msg}"),
            Self::DryRun(msg) => tracing::info!(target: DRY_RUN_TARGET, "{msg}"),
        }
    }
}

/// Implement the methods of [`Log`] by recording each message as the
/// corresponding [`LogEntry`] variant and forwarding it to `tracing`.
macro_rules! buffer_log_methods {
    ($($method:ident => $variant:ident),+ $(,)?) => {
        $(
            fn $method(&self, msg: &str) {
                let entry = LogEntry::$variant(msg.to_string());
                entry.emit();
                if let Ok(mut guard) = self.entries.lock() {
                    guard.push(entry);
                }
            }
        )+
    };
}

/// Logger that records every entry in memory while still forwarding it to
/// `tracing`.
///
/// Useful wherever the caller needs to know what was reported, e.g. to
/// confirm that a dry run described every action it skipped.
#[derive(Debug, Default)]
pub struct BufferedLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl BufferedLog {
    /// Create an empty buffered logger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy of all recorded entries in order.
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().map_or_else(|_| Vec::new(), |g| g.clone())
    }

    /// Return the messages of all dry-run entries in order.
    #[must_use]
    pub fn dry_run_messages(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|e| match e {
                LogEntry::DryRun(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    /// Return `true` if any entry's message contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.entries().iter().any(|e| e.message().contains(needle))
    }
}

impl Log for BufferedLog {
    buffer_log_methods! {
        stage   => Stage,
        info    => Info,
        debug   => Debug,
        warn    => Warn,
        error   => Error,
        dry_run => DryRun,
    }
}
