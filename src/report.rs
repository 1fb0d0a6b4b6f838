//! Per-step results and the persisted report.
//!
//! A [`ResultsAggregator`] is created when a step starts, receives one
//! [`TaskOutcome`] per task, and is consumed by
//! [`finalize`](ResultsAggregator::finalize), so a step is finalized exactly
//! once. The aggregator has no failure policy of its own; the step driver
//! decides whether to keep going after a failure.
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::resources::backup::FileSnapshot;

const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";
const FILE_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Result of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskOutcome {
    /// Task name.
    pub task: String,
    /// Whether the task succeeded.
    pub succeeded: bool,
    /// What happened, or the error.
    pub message: String,
}

impl TaskOutcome {
    /// A successful outcome.
    #[must_use]
    pub fn success(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            succeeded: true,
            message: message.into(),
        }
    }

    /// A failed outcome.
    #[must_use]
    pub fn failure(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            succeeded: false,
            message: message.into(),
        }
    }
}

/// Collects task outcomes for one step run.
#[derive(Debug)]
pub struct ResultsAggregator {
    step: String,
    started_at: DateTime<Local>,
    dry_run: bool,
    cancelled: bool,
    outcomes: Vec<TaskOutcome>,
}

impl ResultsAggregator {
    /// Start recording step `step`.
    #[must_use]
    pub fn new(step: impl Into<String>, dry_run: bool) -> Self {
        Self {
            step: step.into(),
            started_at: Local::now(),
            dry_run,
            cancelled: false,
            outcomes: Vec::new(),
        }
    }

    /// Record a task's outcome.
    pub fn record_task(&mut self, outcome: TaskOutcome) {
        self.outcomes.push(outcome);
    }

    /// Note that the run was interrupted before the step finished.
    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    /// Close the step and build its report.
    ///
    /// `rollback` is the run's rollback registry at this point.
    #[must_use]
    pub fn finalize(self, rollback: &[FileSnapshot]) -> StepReport {
        let (completed, failed): (Vec<&TaskOutcome>, Vec<&TaskOutcome>) =
            self.outcomes.iter().partition(|o| o.succeeded);
        let tasks_completed: Vec<String> = completed.iter().map(|o| o.task.clone()).collect();
        let tasks_failed: Vec<String> = failed.iter().map(|o| o.task.clone()).collect();

        StepReport {
            overall_success: tasks_failed.is_empty() && !self.cancelled,
            timestamp: self.started_at.format(ISO_FORMAT).to_string(),
            completed_at: Local::now().format(ISO_FORMAT).to_string(),
            file_stamp: self.started_at.format(FILE_STAMP_FORMAT).to_string(),
            step: self.step,
            dry_run: self.dry_run,
            cancelled: self.cancelled,
            tasks_completed,
            tasks_failed,
            messages: self.outcomes,
            rollback_info: rollback.to_vec(),
        }
    }
}

/// Finalized result of one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    /// When the step started (ISO 8601, local time).
    pub timestamp: String,
    /// Step identifier.
    pub step: String,
    /// When the step was finalized.
    pub completed_at: String,
    /// Whether mutations were simulated.
    pub dry_run: bool,
    /// Whether the run was interrupted before the step's last task.
    pub cancelled: bool,
    /// Names of tasks that succeeded, in run order.
    pub tasks_completed: Vec<String>,
    /// Names of tasks that failed, in run order.
    pub tasks_failed: Vec<String>,
    /// Every outcome with its message.
    pub messages: Vec<TaskOutcome>,
    /// Snapshots available for manual restoration.
    pub rollback_info: Vec<FileSnapshot>,
    /// `true` iff `tasks_failed` is empty and the step was not cancelled.
    pub overall_success: bool,
    #[serde(skip)]
    file_stamp: String,
}

impl StepReport {
    /// File name this report is persisted under.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}_results_{}.json", self.step, self.file_stamp)
    }

    /// Write the report as pretty JSON into `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn persist(&self, dir: &Path) -> io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        std::fs::write(&path, json + "\n")?;
        Ok(path)
    }
}
