//! The command gateway: the single chokepoint for running external programs.
//!
//! Every process the engine starts (`sshd -t`, `sysctl --system`,
//! `augenrules --load`, ...) goes through [`CommandGateway`], which honours
//! dry-run mode by returning a synthetic success instead of executing.
//! The actual process spawning lives behind the [`Executor`] trait so it can
//! be mocked in tests.
use std::fmt;
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use wait_timeout::ChildExt as _;

use crate::error::CommandError;
use crate::logging::Log;

/// Placeholder stdout returned for commands skipped in dry-run mode.
pub const DRY_RUN_STDOUT: &str = "dry_run_output";

/// Description of an external command.
///
/// # Examples
///
/// ```
/// use hardening_engine::exec::CommandSpec;
///
/// let spec = CommandSpec::new("systemctl").args(["restart", "ssh"]);
/// assert_eq!(spec.to_string(), "systemctl restart ssh");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name or absolute path.
    pub program: String,
    /// Arguments passed verbatim (no shell involved).
    pub args: Vec<String>,
    /// Upper bound on run time; `None` falls back to the executor default.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    /// Start describing a command for `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    /// Append a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Bound this command's run time.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Result of a command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Whether the process exited with status 0.
    pub success: bool,
    /// Exit code, or `None` if the process was killed by a signal.
    pub code: Option<i32>,
}

impl ExecResult {
    /// The synthetic result reported for a command skipped in dry-run mode.
    #[must_use]
    pub fn dry_run() -> Self {
        Self {
            stdout: DRY_RUN_STDOUT.to_string(),
            stderr: String::new(),
            success: true,
            code: Some(0),
        }
    }
}

/// Runs external processes.
///
/// Production code uses [`SystemExecutor`]; tests substitute a mock.
#[cfg_attr(test, mockall::automock)]
pub trait Executor: Send + Sync {
    /// Run `spec` to completion and capture its output.
    ///
    /// A non-zero exit is **not** an error at this level; callers decide.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Spawn`] if the process cannot be started and
    /// [`CommandError::TimedOut`] if it exceeds its timeout.
    fn execute(&self, spec: &CommandSpec) -> Result<ExecResult, CommandError>;

    /// Check if a program is available on `PATH`.
    fn which(&self, program: &str) -> bool;
}

/// [`Executor`] that spawns real processes.
#[derive(Debug, Clone, Default)]
pub struct SystemExecutor {
    default_timeout: Option<Duration>,
}

impl SystemExecutor {
    /// Create an executor; `default_timeout` applies to specs without one.
    #[must_use]
    pub const fn new(default_timeout: Option<Duration>) -> Self {
        Self { default_timeout }
    }
}

fn read_stream<R: Read + Send + 'static>(stream: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut s) = stream {
            s.read_to_end(&mut buf).ok();
        }
        buf
    })
}

fn join_stream(handle: thread::JoinHandle<Vec<u8>>) -> String {
    handle
        .join()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

impl Executor for SystemExecutor {
    fn execute(&self, spec: &CommandSpec) -> Result<ExecResult, CommandError> {
        let command = spec.to_string();
        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CommandError::Spawn {
                command: command.clone(),
                source,
            })?;

        // Drain both pipes while the child runs so a chatty process cannot
        // block on a full pipe buffer.
        let stdout = read_stream(child.stdout.take());
        let stderr = read_stream(child.stderr.take());

        let spawn_err = |source| CommandError::Spawn {
            command: command.clone(),
            source,
        };
        let status = match spec.timeout.or(self.default_timeout) {
            Some(timeout) => {
                if let Some(status) = child.wait_timeout(timeout).map_err(spawn_err)? {
                    status
                } else {
                    tracing::warn!(timeout_secs = timeout.as_secs(), "{command} timed out, killing");
                    child.kill().ok();
                    child.wait().ok();
                    return Err(CommandError::TimedOut {
                        command,
                        timeout_secs: timeout.as_secs(),
                    });
                }
            }
            None => child.wait().map_err(spawn_err)?,
        };

        Ok(ExecResult {
            stdout: join_stream(stdout),
            stderr: join_stream(stderr),
            success: status.success(),
            code: status.code(),
        })
    }

    fn which(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

/// Dry-run aware front door for external commands.
pub struct CommandGateway {
    executor: Arc<dyn Executor>,
    dry_run: bool,
}

impl fmt::Debug for CommandGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandGateway")
            .field("executor", &"<dyn Executor>")
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CommandGateway {
    /// Create a gateway over `executor`.
    #[must_use]
    pub fn new(executor: Arc<dyn Executor>, dry_run: bool) -> Self {
        Self { executor, dry_run }
    }

    /// Run a command, returning its result even on non-zero exit.
    ///
    /// In dry-run mode nothing executes; the intended command is logged and
    /// [`ExecResult::dry_run`] is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be started or times out.
    pub fn run_unchecked(&self, spec: &CommandSpec, log: &dyn Log) -> Result<ExecResult, CommandError> {
        if self.dry_run {
            log.dry_run(&format!("would execute: {spec}"));
            return Ok(ExecResult::dry_run());
        }
        log.debug(&format!("executing: {spec}"));
        let result = self.executor.execute(spec)?;
        log.debug(&format!(
            "{spec} exited with {}",
            result.code.map_or_else(|| "signal".to_string(), |c| c.to_string())
        ));
        Ok(result)
    }

    /// Run a command, treating a non-zero exit as [`CommandError::Failed`].
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be started, times out, or
    /// exits non-zero.
    pub fn run(&self, spec: &CommandSpec, log: &dyn Log) -> Result<ExecResult, CommandError> {
        let result = self.run_unchecked(spec, log)?;
        if !result.success {
            let err = CommandError::Failed {
                command: spec.to_string(),
                exit_code: result.code,
                stderr: result.stderr,
            };
            log.error(&err.to_string());
            return Err(err);
        }
        Ok(result)
    }

    /// Check whether `program` is installed.
    ///
    /// Always `true` in dry-run mode so that simulated runs describe every
    /// step even on machines without the tool.
    #[must_use]
    pub fn which(&self, program: &str) -> bool {
        self.dry_run || self.executor.which(program)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::logging::BufferedLog;

    fn ok_result(stdout: &str) -> ExecResult {
        ExecResult {
            stdout: stdout.to_string(),
            stderr: String::new(),
            success: true,
            code: Some(0),
        }
    }

    #[test]
    fn spec_display_joins_program_and_args() {
        let spec = CommandSpec::new("sysctl").arg("-n").arg("kernel.kptr_restrict");
        assert_eq!(spec.to_string(), "sysctl -n kernel.kptr_restrict");
    }

    #[test]
    fn dry_run_short_circuits_without_executing() {
        let mut mock = MockExecutor::new();
        mock.expect_execute().never();
        let gateway = CommandGateway::new(Arc::new(mock), true);
        let log = BufferedLog::new();

        let result = gateway
            .run(&CommandSpec::new("systemctl").args(["restart", "ssh"]), &log)
            .unwrap();

        assert_eq!(result, ExecResult::dry_run());
        assert_eq!(result.stdout, DRY_RUN_STDOUT);
        assert_eq!(
            log.dry_run_messages(),
            vec!["would execute: systemctl restart ssh"]
        );
    }

    #[test]
    fn run_passes_spec_to_executor() {
        let mut mock = MockExecutor::new();
        mock.expect_execute()
            .withf(|spec| spec.program == "sshd" && spec.args == ["-t"])
            .times(1)
            .returning(|_| Ok(ok_result("")));
        let gateway = CommandGateway::new(Arc::new(mock), false);

        let result = gateway
            .run(&CommandSpec::new("sshd").arg("-t"), &BufferedLog::new())
            .unwrap();
        assert!(result.success);
    }

    #[test]
    fn run_maps_non_zero_exit_to_failed() {
        let mut mock = MockExecutor::new();
        mock.expect_execute().returning(|_| {
            Ok(ExecResult {
                stdout: String::new(),
                stderr: "Bad configuration option".to_string(),
                success: false,
                code: Some(255),
            })
        });
        let gateway = CommandGateway::new(Arc::new(mock), false);
        let log = BufferedLog::new();

        let err = gateway
            .run(&CommandSpec::new("sshd").arg("-t"), &log)
            .unwrap_err();
        assert!(
            matches!(err, CommandError::Failed { exit_code: Some(255), ref stderr, .. } if stderr.contains("Bad configuration")),
            "unexpected error: {err:?}"
        );
        assert!(log.contains("sshd -t"), "failure should be logged with the command");
    }

    #[test]
    fn run_unchecked_returns_non_zero_result() {
        let mut mock = MockExecutor::new();
        mock.expect_execute().returning(|_| {
            Ok(ExecResult {
                stdout: String::new(),
                stderr: String::new(),
                success: false,
                code: Some(1),
            })
        });
        let gateway = CommandGateway::new(Arc::new(mock), false);
        let result = gateway
            .run_unchecked(&CommandSpec::new("false"), &BufferedLog::new())
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.code, Some(1));
    }

    #[test]
    fn which_is_true_in_dry_run() {
        let mut mock = MockExecutor::new();
        mock.expect_which().never();
        let gateway = CommandGateway::new(Arc::new(mock), true);
        assert!(gateway.which("auditctl"));
    }

    #[test]
    fn which_delegates_outside_dry_run() {
        let mut mock = MockExecutor::new();
        mock.expect_which().returning(|p| p == "sysctl");
        let gateway = CommandGateway::new(Arc::new(mock), false);
        assert!(gateway.which("sysctl"));
        assert!(!gateway.which("auditctl"));
    }

    #[cfg(unix)]
    #[test]
    fn system_executor_captures_stdout() {
        let result = SystemExecutor::default()
            .execute(&CommandSpec::new("echo").arg("hello"))
            .unwrap();
        assert!(result.success);
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[cfg(unix)]
    #[test]
    fn system_executor_reports_non_zero_exit() {
        let result = SystemExecutor::default()
            .execute(&CommandSpec::new("false"))
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.code, Some(1));
    }

    #[cfg(unix)]
    #[test]
    fn system_executor_kills_on_timeout() {
        let spec = CommandSpec::new("sleep")
            .arg("5")
            .with_timeout(Duration::from_millis(100));
        let err = SystemExecutor::default().execute(&spec).unwrap_err();
        assert!(matches!(err, CommandError::TimedOut { .. }), "got {err:?}");
    }

    #[test]
    fn system_executor_spawn_failure() {
        let err = SystemExecutor::default()
            .execute(&CommandSpec::new("this-program-does-not-exist-12345"))
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }), "got {err:?}");
    }

    #[test]
    fn system_executor_which_missing_program() {
        assert!(!SystemExecutor::default().which("this-program-does-not-exist-12345"));
    }
}
