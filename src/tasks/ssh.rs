//! Step: harden the SSH daemon.
//!
//! The daemon is only restarted after `sshd -t` accepted the new file in
//! this run, and only when this run changed something it reads. Without
//! `sshd` on `PATH` nothing can be validated, so the restart is not
//! applicable either.
use super::{Context, FailurePolicy, Step, Task, TaskResult, reconcile};
use crate::error::{HardeningError, ResourceError, VerificationFailure};
use crate::exec::CommandSpec;
use crate::resources::directive::{self, Directive, DirectiveStyle};
use crate::resources::file::ConfigFile;
use crate::resources::fs;

/// Step identifier.
pub const STEP_ID: &str = "ssh";

/// Written to the banner path when no banner exists yet.
pub const LOGIN_BANNER: &str = "
***************************************************************************
                    AUTHORIZED ACCESS ONLY

This system is for the use of authorized users only. Individuals using
this computer system without authority, or in excess of their authority,
are subject to having all of their activities on this system monitored
and recorded by system personnel.

In the course of monitoring individuals improperly using this system, or
in the course of system maintenance, the activities of authorized users
may also be monitored.

Anyone using this system expressly consents to such monitoring and is
advised that if such monitoring reveals possible evidence of criminal
activity, system personnel may provide the evidence to law enforcement
officials.
***************************************************************************
";

/// The SSH step with its tasks in run order.
#[must_use]
pub fn step(policy: FailurePolicy) -> Step {
    Step {
        id: STEP_ID,
        title: "SSH daemon hardening",
        policy,
        tasks: vec![
            Box::new(ConfigureSshDaemon),
            Box::new(InstallLoginBanner),
            Box::new(ValidateSshConfig),
            Box::new(RestartSshService),
        ],
    }
}

/// Configured directives, with `AllowUsers` derived from
/// `ssh_allowed_users` when that list is non-empty.
#[must_use]
pub fn desired_directives(ctx: &Context) -> Vec<Directive> {
    let users = &ctx.config.general.ssh_allowed_users;
    let mut directives: Vec<Directive> = ctx
        .config
        .ssh
        .directives
        .iter()
        .filter(|(name, _)| users.is_empty() || !name.eq_ignore_ascii_case("AllowUsers"))
        .map(|(name, value)| Directive::new(name, value))
        .collect();
    if !users.is_empty() {
        directives.push(Directive::new("AllowUsers", users.join(" ")));
    }
    directives
}

/// Patch `sshd_config` with the desired directives.
#[derive(Debug)]
pub struct ConfigureSshDaemon;

impl Task for ConfigureSshDaemon {
    fn name(&self) -> &'static str {
        "Configure SSH daemon"
    }

    fn run(&self, ctx: &mut Context) -> Result<TaskResult, HardeningError> {
        let path = ctx.config.ssh.config_path.clone();
        let current = fs::read_optional(&path)
            .map_err(|source| ResourceError::ReadFailure {
                path: path.clone(),
                source,
            })?
            .unwrap_or_else(|| {
                ctx.log.warn(&format!(
                    "{} not found, writing directives to a new file",
                    path.display()
                ));
                String::new()
            });

        let directives = desired_directives(ctx);
        let patched = directive::patch(&current, &directives, DirectiveStyle::Space);
        ctx.log.debug(&format!("{}: {patched}", path.display()));

        reconcile(ctx, &ConfigFile::patched(path, patched.content))
    }
}

/// Write the login banner if none exists.
#[derive(Debug)]
pub struct InstallLoginBanner;

impl Task for InstallLoginBanner {
    fn name(&self) -> &'static str {
        "Install login banner"
    }

    fn run(&self, ctx: &mut Context) -> Result<TaskResult, HardeningError> {
        let path = ctx.config.ssh.banner_path.clone();
        if path.exists() {
            return Ok(TaskResult::Skipped(format!(
                "{} already exists",
                path.display()
            )));
        }
        reconcile(ctx, &ConfigFile::generated(path, LOGIN_BANNER.to_string()))
    }
}

/// Check the daemon accepts the patched file.
#[derive(Debug)]
pub struct ValidateSshConfig;

impl Task for ValidateSshConfig {
    fn name(&self) -> &'static str {
        "Validate SSH config"
    }

    fn should_run(&self, ctx: &Context) -> bool {
        ctx.commands.which("sshd")
    }

    fn run(&self, ctx: &mut Context) -> Result<TaskResult, HardeningError> {
        let path = ctx.config.ssh.config_path.clone();
        let spec = CommandSpec::new("sshd")
            .arg("-t")
            .arg("-f")
            .arg(path.to_string_lossy());
        let result = ctx.commands.run_unchecked(&spec, ctx.log.as_ref())?;
        if ctx.dry_run() {
            ctx.mark_validated(&path);
            return Ok(TaskResult::DryRun(format!("would run {spec}")));
        }
        if !result.success {
            return Err(VerificationFailure::new(spec.to_string(), result.stderr.trim()).into());
        }
        ctx.mark_validated(&path);
        Ok(TaskResult::Ok("configuration accepted".to_string()))
    }
}

/// Restart the daemon so it picks up the new configuration.
#[derive(Debug)]
pub struct RestartSshService;

impl Task for RestartSshService {
    fn name(&self) -> &'static str {
        "Restart SSH service"
    }

    fn should_run(&self, ctx: &Context) -> bool {
        ctx.commands.which("systemctl") && ctx.commands.which("sshd")
    }

    fn run(&self, ctx: &mut Context) -> Result<TaskResult, HardeningError> {
        let ssh = &ctx.config.ssh;
        if !ctx.was_modified(&ssh.config_path) && !ctx.was_modified(&ssh.banner_path) {
            return Ok(TaskResult::Skipped("SSH configuration unchanged".to_string()));
        }

        let service = ssh.service.clone();
        if !ctx.was_validated(&ssh.config_path) {
            return Err(VerificationFailure::new(
                "sshd -t",
                format!("configuration not validated; refusing to restart {service}"),
            )
            .into());
        }

        let restart = CommandSpec::new("systemctl").args(["restart", service.as_str()]);
        ctx.commands.run(&restart, ctx.log.as_ref())?;
        if ctx.dry_run() {
            return Ok(TaskResult::DryRun(format!("would run {restart}")));
        }

        let status = CommandSpec::new("systemctl").args(["is-active", service.as_str()]);
        let active = ctx.commands.run_unchecked(&status, ctx.log.as_ref())?;
        if active.success && active.stdout.trim() == "active" {
            ctx.log.info(&format!("{service} restarted"));
        } else {
            ctx.log
                .warn(&format!("{service} may not be running properly"));
        }
        Ok(TaskResult::Ok(format!("restarted {service}")))
    }
}
