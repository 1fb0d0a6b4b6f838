//! Step: kernel and network parameters.
use super::{Context, FailurePolicy, Step, Task, TaskResult, reconcile};
use crate::error::{HardeningError, VerificationFailure};
use crate::exec::CommandSpec;
use crate::resources::file::ConfigFile;
use crate::resources::sysctl::ParameterSet;

/// Step identifier.
pub const STEP_ID: &str = "sysctl";

/// The sysctl step with its tasks in run order.
#[must_use]
pub fn step(policy: FailurePolicy) -> Step {
    Step {
        id: STEP_ID,
        title: "Kernel parameter hardening",
        policy,
        tasks: vec![
            Box::new(WriteSysctlConfig),
            Box::new(ApplySysctl),
            Box::new(VerifySysctl),
        ],
    }
}

fn parameters(ctx: &Context) -> ParameterSet {
    ParameterSet::with_overrides(&ctx.config.sysctl.parameters)
}

/// Regenerate the sysctl drop-in file.
#[derive(Debug)]
pub struct WriteSysctlConfig;

impl Task for WriteSysctlConfig {
    fn name(&self) -> &'static str {
        "Write sysctl config"
    }

    fn run(&self, ctx: &mut Context) -> Result<TaskResult, HardeningError> {
        let params = parameters(ctx);
        ctx.log.debug(&format!("{} kernel parameters", params.len()));
        let file = ConfigFile::generated(ctx.config.sysctl.config_path.clone(), params.render());
        reconcile(ctx, &file)
    }
}

/// Load required modules, then have the kernel re-read every drop-in.
#[derive(Debug)]
pub struct ApplySysctl;

impl Task for ApplySysctl {
    fn name(&self) -> &'static str {
        "Apply sysctl"
    }

    fn should_run(&self, ctx: &Context) -> bool {
        ctx.commands.which("sysctl")
    }

    fn run(&self, ctx: &mut Context) -> Result<TaskResult, HardeningError> {
        for module in &ctx.config.sysctl.load_modules {
            let spec = CommandSpec::new("modprobe").arg(module.as_str());
            match ctx.commands.run_unchecked(&spec, ctx.log.as_ref()) {
                Ok(result) if result.success => {}
                Ok(result) => ctx.log.warn(&format!(
                    "could not load module {module}: {}",
                    result.stderr.trim()
                )),
                Err(e) => ctx.log.warn(&format!("could not load module {module}: {e}")),
            }
        }

        let spec = CommandSpec::new("sysctl").arg("--system");
        ctx.commands.run(&spec, ctx.log.as_ref())?;
        if ctx.dry_run() {
            return Ok(TaskResult::DryRun(format!("would run {spec}")));
        }
        Ok(TaskResult::Ok("kernel parameters loaded".to_string()))
    }
}

/// Read every parameter back and compare it with the desired value.
#[derive(Debug)]
pub struct VerifySysctl;

/// Collapse runs of whitespace; the kernel reports multi-value parameters
/// tab-separated.
fn normalize(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl Task for VerifySysctl {
    fn name(&self) -> &'static str {
        "Verify sysctl"
    }

    fn should_run(&self, ctx: &Context) -> bool {
        ctx.config.sysctl.verify && ctx.commands.which("sysctl")
    }

    fn run(&self, ctx: &mut Context) -> Result<TaskResult, HardeningError> {
        let params = parameters(ctx);
        if ctx.dry_run() {
            ctx.log
                .dry_run(&format!("would verify {} kernel parameters", params.len()));
            return Ok(TaskResult::DryRun(format!(
                "would verify {} parameters",
                params.len()
            )));
        }

        let mut mismatches = Vec::new();
        let mut unavailable = 0_usize;
        for (key, desired) in params.iter() {
            let spec = CommandSpec::new("sysctl").args(["-n", key]);
            let result = ctx.commands.run_unchecked(&spec, ctx.log.as_ref())?;
            if !result.success {
                ctx.log.warn(&format!(
                    "{key} is not available on this kernel: {}",
                    result.stderr.trim()
                ));
                unavailable += 1;
                continue;
            }
            let actual = normalize(&result.stdout);
            if actual != normalize(desired) {
                mismatches.push(format!("{key}={actual} (want {desired})"));
            }
        }

        if !mismatches.is_empty() {
            return Err(VerificationFailure::new("sysctl -n", mismatches.join(", ")).into());
        }
        let checked = params.len() - unavailable;
        Ok(TaskResult::Ok(if unavailable == 0 {
            format!("{checked} parameters verified")
        } else {
            format!("{checked} parameters verified, {unavailable} unavailable")
        }))
    }
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
    use crate::exec::{ExecResult, MockExecutor};
    use crate::resources::sysctl::DEFAULT_PARAMETERS;
    use crate::tasks::run_step;
    use crate::tasks::test_helpers::{ScriptedExecutor, config_in, make_context, ok, seed};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn write_regenerates_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(
            dir.path(),
            json!({"sysctl": {"parameters": {"net.ipv4.ip_forward": 0, "custom.param": "5"}}}),
        );
        let path = config.sysctl.config_path.clone();
        seed(&path, "# stale\nvm.swappiness=60\n");
        let (mut ctx, _) = make_context(config, Arc::new(ScriptedExecutor::new()));

        WriteSysctlConfig.run(&mut ctx).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("vm.swappiness"), "prior content is not preserved");
        assert!(text.contains("\nnet.ipv4.ip_forward=0\n"));
        assert!(text.contains("# Other Parameters\n"));
        assert!(text.ends_with("custom.param=5\n"));
        assert_eq!(ctx.backups.registry().len(), 1);
    }

    #[test]
    fn apply_loads_modules_then_system() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(ScriptedExecutor::new());
        exec.fail("modprobe br_netfilter", "Module br_netfilter not found");
        let (mut ctx, log) = make_context(
            config_in(dir.path(), json!({})),
            Arc::clone(&exec) as Arc<dyn crate::exec::Executor>,
        );

        let result = ApplySysctl.run(&mut ctx).unwrap();

        assert!(matches!(result, TaskResult::Ok(_)));
        assert_eq!(exec.calls(), ["modprobe br_netfilter", "sysctl --system"]);
        assert!(log.contains("could not load module br_netfilter"));
    }

    #[test]
    fn apply_failure_is_a_command_error() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(ScriptedExecutor::new());
        exec.fail("sysctl --system", "permission denied");
        let (mut ctx, _) = make_context(config_in(dir.path(), json!({})), exec);

        let err = ApplySysctl.run(&mut ctx).unwrap_err();
        assert!(matches!(err, HardeningError::Command(_)), "{err:?}");
    }

    #[test]
    fn verify_reports_mismatches() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(
            dir.path(),
            json!({"sysctl": {"parameters": {"kernel.kptr_restrict": "2"}}}),
        );
        let mut mock = MockExecutor::new();
        mock.expect_execute().returning(|spec| {
            let key = spec.args[1].as_str();
            Ok(match key {
                "kernel.kptr_restrict" => ok("1\n"),
                _ => {
                    let want = DEFAULT_PARAMETERS
                        .iter()
                        .find(|(k, _)| *k == key)
                        .map_or("", |(_, v)| *v);
                    ok(&format!("{want}\n"))
                }
            })
        });
        let (mut ctx, _) = make_context(config, Arc::new(mock));

        let err = VerifySysctl.run(&mut ctx).unwrap_err();

        let HardeningError::Verification(failure) = err else {
            panic!("expected verification failure, got {err:?}");
        };
        assert_eq!(failure.detail, "kernel.kptr_restrict=1 (want 2)");
    }

    #[test]
    fn verify_tolerates_unavailable_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockExecutor::new();
        mock.expect_execute().returning(|spec| {
            let key = spec.args[1].clone();
            if key.starts_with("net.bridge.") {
                return Ok(ExecResult {
                    stdout: String::new(),
                    stderr: format!("sysctl: cannot stat /proc/sys/{key}"),
                    success: false,
                    code: Some(255),
                });
            }
            let want = DEFAULT_PARAMETERS
                .iter()
                .find(|(k, _)| *k == key)
                .map_or("", |(_, v)| *v);
            Ok(ok(want))
        });
        let (mut ctx, log) = make_context(config_in(dir.path(), json!({})), Arc::new(mock));

        let result = VerifySysctl.run(&mut ctx).unwrap();

        let expected = format!(
            "{} parameters verified, 2 unavailable",
            DEFAULT_PARAMETERS.len() - 2
        );
        assert_eq!(result, TaskResult::Ok(expected));
        assert!(log.contains("not available on this kernel"));
    }

    #[test]
    fn verify_not_applicable_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _) = make_context(
            config_in(dir.path(), json!({"sysctl": {"verify": false}})),
            Arc::new(ScriptedExecutor::new()),
        );
        assert!(!VerifySysctl.should_run(&ctx));
    }

    #[test]
    fn normalize_collapses_tabs() {
        assert_eq!(normalize("4096\t87380\t6291456\n"), "4096 87380 6291456");
    }

    #[test]
    fn accumulate_policy_reports_every_failure() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(ScriptedExecutor::new());
        exec.fail("sysctl --system", "boom");
        let (mut ctx, _) = make_context(
            config_in(dir.path(), json!({"sysctl": {"verify": false}})),
            exec,
        );

        let report = run_step(&step(FailurePolicy::AccumulateFailures), &mut ctx);

        assert_eq!(report.tasks_completed, ["Write sysctl config"]);
        assert_eq!(report.tasks_failed, ["Apply sysctl"]);
        assert!(!report.overall_success);
    }

    #[test]
    fn dry_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), json!({"dry_run": true}));
        let path = config.sysctl.config_path.clone();
        let mut mock = MockExecutor::new();
        mock.expect_execute().never();
        let (mut ctx, log) = make_context(config, Arc::new(mock));

        let report = run_step(&step(FailurePolicy::AccumulateFailures), &mut ctx);

        assert!(report.overall_success);
        assert_eq!(report.tasks_completed.len(), 3);
        assert!(!path.exists());
        assert!(log.contains("would execute: sysctl --system"));
        assert!(log.contains("would execute: modprobe br_netfilter"));
    }
}
