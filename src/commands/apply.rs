//! Command: reconcile the host with the desired state.
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Result, bail};

use crate::cli::{ApplyOpts, GlobalOpts};
use crate::config::ResolvedConfig;
use crate::error::HardeningError;
use crate::exec::{Executor, SystemExecutor};
use crate::logging::{Log, Logger};
use crate::report::StepReport;
use crate::tasks::{self, Context, STEP_IDS, Step};

/// Run the apply command.
///
/// # Errors
///
/// Returns an error if the configuration cannot be read, a step id is
/// unknown, the run is cancelled, or any step reports a failure.
pub fn run(
    global: &GlobalOpts,
    opts: &ApplyOpts,
    log: &Arc<Logger>,
    cancelled: Arc<AtomicBool>,
) -> Result<()> {
    log.info(&format!("harden {}", super::version::version()));

    log.stage("Loading configuration");
    let config = ResolvedConfig::load(
        global.config.as_deref(),
        global.dry_run.then_some(true),
        log.as_ref(),
    )?;
    if config.dry_run() {
        log.info("dry run: no files will be changed and no commands executed");
    }

    let executor: Arc<dyn Executor> = Arc::new(SystemExecutor::new(config.command_timeout()));
    let mut ctx = Context::new(
        Arc::new(config),
        Arc::clone(log) as Arc<dyn Log>,
        executor,
    )
    .with_cancel_flag(cancelled);

    let reports = run_steps(&mut ctx, opts)?;

    if let Some(path) = log.log_path() {
        log.info(&format!("log written to {}", path.display()));
    }
    summarize(&reports)
}

/// Steps to run: enabled in the configuration and selected by
/// `--only` / `--skip`.
///
/// # Errors
///
/// Returns an error if `--only` or `--skip` names an unknown step.
pub fn select_steps(config: &ResolvedConfig, opts: &ApplyOpts, log: &dyn Log) -> Result<Vec<Step>> {
    for id in opts.only.iter().chain(&opts.skip) {
        if !STEP_IDS.iter().any(|known| known.eq_ignore_ascii_case(id)) {
            bail!(
                "unknown step '{id}' (expected one of: {})",
                STEP_IDS.join(", ")
            );
        }
    }
    let named = |ids: &[String], id: &str| ids.iter().any(|s| s.eq_ignore_ascii_case(id));

    Ok(tasks::all_steps(config)
        .into_iter()
        .filter(|step| {
            if !opts.only.is_empty() {
                return named(&opts.only, step.id);
            }
            !named(&opts.skip, step.id)
        })
        .filter(|step| {
            let enabled = config.step(step.id).enabled;
            if !enabled {
                log.info(&format!("{}: disabled in configuration", step.id));
            }
            enabled
        })
        .collect())
}

/// Run every selected step and persist its report.
///
/// A report that cannot be written is logged; the step's own outcome is
/// unaffected. A step interrupted by Ctrl-C still has its partial report
/// persisted before the run stops.
///
/// # Errors
///
/// Returns an error if a step id is unknown or the run is cancelled.
pub fn run_steps(ctx: &mut Context, opts: &ApplyOpts) -> Result<Vec<StepReport>> {
    let steps = select_steps(&ctx.config, opts, ctx.log.as_ref())?;
    let report_dir = ctx.config.general.report_dir.clone();

    let mut reports = Vec::with_capacity(steps.len());
    for step in &steps {
        let report = tasks::run_step(step, ctx);
        match report.persist(&report_dir) {
            Ok(path) => ctx
                .log
                .debug(&format!("{} report written to {}", step.id, path.display())),
            Err(e) => ctx.log.error(&format!(
                "cannot write {} report to {}: {e}",
                step.id,
                report_dir.display()
            )),
        }
        if report.cancelled {
            return Err(HardeningError::Cancelled.into());
        }
        reports.push(report);
    }
    Ok(reports)
}

/// Bail if any step failed.
///
/// # Errors
///
/// Returns an error naming the failed steps.
pub fn summarize(reports: &[StepReport]) -> Result<()> {
    let failed: Vec<&str> = reports
        .iter()
        .filter(|r| !r.overall_success)
        .map(|r| r.step.as_str())
        .collect();
    if !failed.is_empty() {
        bail!("{} step(s) failed: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}
