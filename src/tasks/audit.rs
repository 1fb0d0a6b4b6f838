//! Step: audit daemon settings, audit rules and system log routing.
//!
//! Daemons are only restarted, and rules only loaded, when this run changed
//! the file they read. The rule file ends in `-e 2`, after which the kernel
//! refuses further loads until reboot, so an unchanged re-run must not try.
use super::{Context, FailurePolicy, Step, Task, TaskResult, reconcile};
use crate::error::{HardeningError, ResourceError, VerificationFailure};
use crate::exec::CommandSpec;
use crate::resources::audit_rules;
use crate::resources::directive::{self, Directive, DirectiveStyle};
use crate::resources::file::ConfigFile;
use crate::resources::{fs, rsyslog};

/// Step identifier.
pub const STEP_ID: &str = "audit";

/// The audit step with its tasks in run order.
#[must_use]
pub fn step(policy: FailurePolicy) -> Step {
    Step {
        id: STEP_ID,
        title: "Auditing",
        policy,
        tasks: vec![
            Box::new(ConfigureAuditDaemon),
            Box::new(WriteAuditRules),
            Box::new(ConfigureRsyslog),
            Box::new(EnableAuditService),
            Box::new(LoadAuditRules),
            Box::new(RestartRsyslog),
            Box::new(VerifyAuditRules),
        ],
    }
}

/// Patch `auditd.conf` with the configured settings.
#[derive(Debug)]
pub struct ConfigureAuditDaemon;

impl Task for ConfigureAuditDaemon {
    fn name(&self) -> &'static str {
        "Configure audit daemon"
    }

    fn run(&self, ctx: &mut Context) -> Result<TaskResult, HardeningError> {
        let path = ctx.config.auditd.config_path.clone();
        let current = fs::read_optional(&path)
            .map_err(|source| ResourceError::ReadFailure {
                path: path.clone(),
                source,
            })?
            .unwrap_or_default();

        // `max_log_file` is a prefix of `max_log_file_action`.
        let directives = directive::order_most_specific_first(
            ctx.config
                .auditd
                .settings
                .iter()
                .map(|(name, value)| Directive::new(name, value))
                .collect(),
        );
        let patched = directive::patch(&current, &directives, DirectiveStyle::Equals);
        ctx.log.debug(&format!("{}: {patched}", path.display()));

        reconcile(ctx, &ConfigFile::patched(path, patched.content))
    }
}

/// Regenerate the audit rules file.
#[derive(Debug)]
pub struct WriteAuditRules;

impl Task for WriteAuditRules {
    fn name(&self) -> &'static str {
        "Write audit rules"
    }

    fn run(&self, ctx: &mut Context) -> Result<TaskResult, HardeningError> {
        let rule_set = ctx.config.rule_set();
        ctx.log.info(&format!(
            "{} audit rules ({})",
            rule_set.len(),
            rule_set.source()
        ));
        let file = ConfigFile::generated(
            ctx.config.audit.rules_path.clone(),
            audit_rules::generate(&rule_set),
        );
        reconcile(ctx, &file)
    }
}

/// Regenerate the `rsyslog.d` drop-in.
#[derive(Debug)]
pub struct ConfigureRsyslog;

impl Task for ConfigureRsyslog {
    fn name(&self) -> &'static str {
        "Configure rsyslog"
    }

    fn run(&self, ctx: &mut Context) -> Result<TaskResult, HardeningError> {
        let file = ConfigFile::generated(ctx.config.rsyslog.config_path.clone(), rsyslog::render());
        reconcile(ctx, &file)
    }
}

/// Fail unless systemd reports `service` active.
fn ensure_active(ctx: &Context, service: &str, failure: &str) -> Result<(), HardeningError> {
    let spec = CommandSpec::new("systemctl").args(["is-active", service]);
    let result = ctx.commands.run_unchecked(&spec, ctx.log.as_ref())?;
    if !result.success {
        return Err(VerificationFailure::new(spec.to_string(), failure).into());
    }
    Ok(())
}

/// Enable `auditd` and make sure it runs the current `auditd.conf`.
///
/// The daemon is restarted when `auditd.conf` changed in this run and only
/// started otherwise; either way it must report active afterwards.
#[derive(Debug)]
pub struct EnableAuditService;

impl Task for EnableAuditService {
    fn name(&self) -> &'static str {
        "Enable audit service"
    }

    fn should_run(&self, ctx: &Context) -> bool {
        ctx.commands.which("systemctl")
    }

    fn run(&self, ctx: &mut Context) -> Result<TaskResult, HardeningError> {
        let action = if ctx.was_modified(&ctx.config.auditd.config_path) {
            "restart"
        } else {
            "start"
        };
        for verb in ["enable", action] {
            let spec = CommandSpec::new("systemctl").args([verb, "auditd"]);
            ctx.commands.run(&spec, ctx.log.as_ref())?;
        }
        if ctx.dry_run() {
            return Ok(TaskResult::DryRun(format!("would enable and {action} auditd")));
        }

        ensure_active(ctx, "auditd", "auditd service failed to start properly")?;
        let done = if action == "restart" { "restarted" } else { "started" };
        Ok(TaskResult::Ok(format!("auditd enabled and {done}")))
    }
}

/// Compile `rules.d` and load the result into the kernel.
#[derive(Debug)]
pub struct LoadAuditRules;

impl Task for LoadAuditRules {
    fn name(&self) -> &'static str {
        "Load audit rules"
    }

    fn should_run(&self, ctx: &Context) -> bool {
        ctx.commands.which("augenrules")
    }

    fn run(&self, ctx: &mut Context) -> Result<TaskResult, HardeningError> {
        if !ctx.was_modified(&ctx.config.audit.rules_path) {
            return Ok(TaskResult::Skipped("audit rules unchanged".to_string()));
        }
        let spec = CommandSpec::new("augenrules").arg("--load");
        ctx.commands.run(&spec, ctx.log.as_ref())?;
        if ctx.dry_run() {
            return Ok(TaskResult::DryRun(format!("would run {spec}")));
        }
        Ok(TaskResult::Ok("audit rules loaded".to_string()))
    }
}

/// Restart rsyslog after its drop-in changed.
#[derive(Debug)]
pub struct RestartRsyslog;

impl Task for RestartRsyslog {
    fn name(&self) -> &'static str {
        "Restart rsyslog"
    }

    fn should_run(&self, ctx: &Context) -> bool {
        ctx.commands.which("systemctl")
    }

    fn run(&self, ctx: &mut Context) -> Result<TaskResult, HardeningError> {
        if !ctx.was_modified(&ctx.config.rsyslog.config_path) {
            return Ok(TaskResult::Skipped("rsyslog configuration unchanged".to_string()));
        }
        let service = ctx.config.rsyslog.service.clone();
        let restart = CommandSpec::new("systemctl").args(["restart", service.as_str()]);
        ctx.commands.run(&restart, ctx.log.as_ref())?;
        if ctx.dry_run() {
            return Ok(TaskResult::DryRun(format!("would run {restart}")));
        }

        ensure_active(
            ctx,
            &service,
            &format!("{service} service failed to restart properly"),
        )?;
        Ok(TaskResult::Ok(format!("restarted {service}")))
    }
}

/// Check the kernel reports a non-empty rule list.
#[derive(Debug)]
pub struct VerifyAuditRules;

impl Task for VerifyAuditRules {
    fn name(&self) -> &'static str {
        "Verify audit rules"
    }

    fn should_run(&self, ctx: &Context) -> bool {
        ctx.commands.which("auditctl")
    }

    fn run(&self, ctx: &mut Context) -> Result<TaskResult, HardeningError> {
        let spec = CommandSpec::new("auditctl").arg("-l");
        let result = ctx.commands.run_unchecked(&spec, ctx.log.as_ref())?;
        if ctx.dry_run() {
            return Ok(TaskResult::DryRun(format!("would run {spec}")));
        }

        let listed = result.stdout.trim();
        if !result.success {
            return Err(VerificationFailure::new(spec.to_string(), result.stderr.trim()).into());
        }
        if listed.is_empty() || listed == "No rules" {
            return Err(VerificationFailure::new(spec.to_string(), "no audit rules loaded").into());
        }
        Ok(TaskResult::Ok(format!("{} rules loaded", listed.lines().count())))
    }
}
