//! Steps and the tasks they run.
//!
//! A [`Step`] is an ordered list of [`Task`]s plus a [`FailurePolicy`].
//! [`run_step`] drives the tasks in order, records each outcome into a
//! [`ResultsAggregator`] and finalizes exactly one [`StepReport`]. Tasks are
//! thin: they render content with the generators, hand the file to the
//! resource layer, and run external commands through the gateway.
pub mod audit;
mod context;
pub mod ssh;
pub mod sysctl;

pub use context::Context;

use crate::config::ResolvedConfig;
use crate::config::sections::StepSettings;
use crate::error::HardeningError;
use crate::report::{ResultsAggregator, StepReport, TaskOutcome};
use crate::resources::file::ConfigFile;
use crate::resources::{Resource, ResourceChange};

/// Result of a task that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult {
    /// Task completed; the message says what happened.
    Ok(String),
    /// Task had nothing to do.
    Skipped(String),
    /// Task ran in dry-run mode and only described its changes.
    DryRun(String),
}

impl TaskResult {
    /// Message recorded in the step report.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Ok(msg) | Self::DryRun(msg) => msg.clone(),
            Self::Skipped(reason) => format!("skipped: {reason}"),
        }
    }
}

/// A named unit of work inside a step.
pub trait Task: Send + Sync {
    /// Human-readable task name, used as the report key.
    fn name(&self) -> &str;

    /// Whether this task applies on the current system.
    ///
    /// Tasks that do not apply are logged and left out of the report.
    fn should_run(&self, _ctx: &Context) -> bool {
        true
    }

    /// Execute the task.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be protected or written, a command
    /// fails, or a post-apply check reports failure.
    fn run(&self, ctx: &mut Context) -> Result<TaskResult, HardeningError>;
}

/// What a step does after a task fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop the step; later tasks do not run.
    AbortOnFirstFailure,
    /// Run every task and report all failures.
    AccumulateFailures,
}

impl From<StepSettings> for FailurePolicy {
    fn from(settings: StepSettings) -> Self {
        if settings.abort_on_first_failure {
            Self::AbortOnFirstFailure
        } else {
            Self::AccumulateFailures
        }
    }
}

/// An ordered group of tasks reported as one unit.
pub struct Step {
    /// Identifier used on the command line and in report file names.
    pub id: &'static str,
    /// Stage header.
    pub title: &'static str,
    /// Behaviour after a failed task.
    pub policy: FailurePolicy,
    /// Tasks in run order.
    pub tasks: Vec<Box<dyn Task>>,
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.tasks.iter().map(|t| t.name()).collect();
        f.debug_struct("Step")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("policy", &self.policy)
            .field("tasks", &names)
            .finish()
    }
}

/// Identifiers of every step, in run order.
pub const STEP_IDS: [&str; 3] = [ssh::STEP_ID, sysctl::STEP_ID, audit::STEP_ID];

/// Every step in run order, with failure policies taken from `config`.
#[must_use]
pub fn all_steps(config: &ResolvedConfig) -> Vec<Step> {
    vec![
        ssh::step(config.step(ssh::STEP_ID).into()),
        sysctl::step(config.step(sysctl::STEP_ID).into()),
        audit::step(config.step(audit::STEP_ID).into()),
    ]
}

/// Run one task and turn its result into a report entry.
pub fn execute(task: &dyn Task, ctx: &mut Context) -> TaskOutcome {
    ctx.log.stage(task.name());

    match task.run(ctx) {
        Ok(result) => {
            if let TaskResult::Skipped(reason) = &result {
                ctx.log.info(&format!("skipped: {reason}"));
            }
            TaskOutcome::success(task.name(), result.message())
        }
        Err(e) => {
            ctx.log.error(&format!("{}: {e}", task.name()));
            TaskOutcome::failure(task.name(), e.to_string())
        }
    }
}

/// Drive `step` to completion and finalize its report.
///
/// If the run is interrupted between tasks the report is still finalized,
/// with the outcomes recorded so far and `cancelled` set.
pub fn run_step(step: &Step, ctx: &mut Context) -> StepReport {
    ctx.log.stage(step.title);
    let mut aggregator = ResultsAggregator::new(step.id, ctx.dry_run());

    for task in &step.tasks {
        if ctx.is_cancelled() {
            ctx.log
                .warn(&format!("{}: cancelled before {}", step.id, task.name()));
            aggregator.mark_cancelled();
            break;
        }
        if !task.should_run(ctx) {
            ctx.log
                .debug(&format!("skipping task: {} (not applicable)", task.name()));
            continue;
        }

        let outcome = execute(task.as_ref(), ctx);
        let failed = !outcome.succeeded;
        aggregator.record_task(outcome);

        if failed && step.policy == FailurePolicy::AbortOnFirstFailure {
            ctx.log.warn(&format!(
                "{}: aborting after failed task {}",
                step.id,
                task.name()
            ));
            break;
        }
    }

    let report = aggregator.finalize(ctx.backups.registry());
    if report.cancelled {
        return report;
    }
    if report.overall_success {
        ctx.log.info(&format!(
            "{}: {} task(s) completed",
            step.id,
            report.tasks_completed.len()
        ));
    } else {
        ctx.log.error(&format!(
            "{}: {} task(s) failed",
            step.id,
            report.tasks_failed.len()
        ));
    }
    report
}

/// Bring `file` to its desired content and describe what happened.
pub(crate) fn reconcile(ctx: &mut Context, file: &ConfigFile) -> Result<TaskResult, HardeningError> {
    let dry_run = ctx.dry_run();
    let change = file.apply(&mut ctx.backups, dry_run, ctx.log.as_ref())?;
    let target = file.description();
    if matches!(change, ResourceChange::Applied | ResourceChange::DryRun) {
        ctx.mark_modified(file.path());
    }
    Ok(match change {
        ResourceChange::Applied => TaskResult::Ok(format!("updated {target}")),
        ResourceChange::AlreadyCorrect => TaskResult::Skipped(format!("{target} already up to date")),
        ResourceChange::DryRun => TaskResult::DryRun(format!("would update {target}")),
    })
}

/// Shared helpers for task unit tests.
#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
pub mod test_helpers {
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use serde_json::{Value, json};

    use crate::config::ResolvedConfig;
    use crate::config::defaults::default_document;
    use crate::config::merge::deep_merge;
    use crate::error::CommandError;
    use crate::exec::{CommandSpec, ExecResult, Executor};
    use crate::logging::BufferedLog;

    use super::Context;

    /// Executor that records every command and answers from a script.
    ///
    /// Commands without a scripted response succeed with empty output.
    #[derive(Debug, Default)]
    pub struct ScriptedExecutor {
        /// Value returned by `which()` for every program.
        pub which_result: bool,
        responses: Mutex<HashMap<String, ExecResult>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedExecutor {
        /// An executor whose `which()` finds every program.
        #[must_use]
        pub fn new() -> Self {
            Self {
                which_result: true,
                ..Self::default()
            }
        }

        /// Answer `command` (rendered, e.g. `"sshd -t"`) with `result`.
        pub fn respond(&self, command: &str, result: ExecResult) {
            self.responses
                .lock()
                .unwrap()
                .insert(command.to_string(), result);
        }

        /// Answer `command` with a non-zero exit and `stderr`.
        pub fn fail(&self, command: &str, stderr: &str) {
            self.respond(
                command,
                ExecResult {
                    stdout: String::new(),
                    stderr: stderr.to_string(),
                    success: false,
                    code: Some(1),
                },
            );
        }

        /// Answer `command` with success and `stdout`.
        pub fn succeed(&self, command: &str, stdout: &str) {
            self.respond(command, ok(stdout));
        }

        /// Rendered commands executed so far.
        #[must_use]
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    /// A successful result with `stdout`.
    #[must_use]
    pub fn ok(stdout: &str) -> ExecResult {
        ExecResult {
            stdout: stdout.to_string(),
            stderr: String::new(),
            success: true,
            code: Some(0),
        }
    }

    impl Executor for ScriptedExecutor {
        fn execute(&self, spec: &CommandSpec) -> Result<ExecResult, CommandError> {
            let rendered = spec.to_string();
            self.calls.lock().unwrap().push(rendered.clone());
            Ok(self
                .responses
                .lock()
                .unwrap()
                .get(&rendered)
                .cloned()
                .unwrap_or_else(|| ok("")))
        }

        fn which(&self, _: &str) -> bool {
            self.which_result
        }
    }

    /// Defaults with every managed path moved under `root`, then `overlay`
    /// merged on top.
    #[must_use]
    pub fn config_in(root: &Path, overlay: Value) -> ResolvedConfig {
        let p = |rel: &str| root.join(rel).to_string_lossy().into_owned();
        let mut doc = default_document();
        deep_merge(
            &mut doc,
            json!({
                "backup_dir": p("backups"),
                "report_dir": p("results"),
                "ssh": {
                    "config_path": p("etc/ssh/sshd_config"),
                    "banner_path": p("etc/issue.net")
                },
                "sysctl": { "config_path": p("etc/sysctl.d/99-hardening.conf") },
                "auditd": { "config_path": p("etc/audit/auditd.conf") },
                "audit": { "rules_path": p("etc/audit/rules.d/99-hardening.rules") },
                "rsyslog": { "config_path": p("etc/rsyslog.d/99-hardening.conf") }
            }),
        );
        deep_merge(&mut doc, overlay);
        ResolvedConfig::from_document(&doc).unwrap()
    }

    /// Build a [`Context`] over `config` and `executor`, also returning the
    /// log so tests can inspect messages.
    #[must_use]
    pub fn make_context(
        config: ResolvedConfig,
        executor: Arc<dyn Executor>,
    ) -> (Context, Arc<BufferedLog>) {
        let log = Arc::new(BufferedLog::new());
        let ctx = Context::new(
            Arc::new(config),
            Arc::clone(&log) as Arc<dyn crate::logging::Log>,
            executor,
        );
        (ctx, log)
    }

    /// Write `content` to `path`, creating parents.
    pub fn seed(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
}
