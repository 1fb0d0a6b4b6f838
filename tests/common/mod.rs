// Shared helpers for integration tests.
//
// Provides a temporary root with every managed path redirected into it, a
// recording executor standing in for real processes, and a context builder
// so each test can drive full steps without touching the host.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use hardening_engine::config::ResolvedConfig;
use hardening_engine::config::defaults::default_document;
use hardening_engine::config::merge::deep_merge;
use hardening_engine::error::CommandError;
use hardening_engine::exec::{CommandSpec, ExecResult, Executor};
use hardening_engine::logging::{BufferedLog, Log};
use hardening_engine::tasks::Context;
use serde_json::{Value, json};

/// A stock Debian `sshd_config` excerpt.
pub const SSHD_CONFIG: &str = "\
# This is the sshd server system-wide configuration file.

Include /etc/ssh/sshd_config.d/*.conf

#Port 22
PermitRootLogin yes
#PasswordAuthentication yes
KbdInteractiveAuthentication no
UsePAM yes
X11Forwarding yes
PrintMotd no
AcceptEnv LANG LC_*
Subsystem\tsftp\t/usr/lib/openssh/sftp-server
";

/// A stock `auditd.conf` excerpt.
pub const AUDITD_CONF: &str = "\
#
# This file controls the configuration of the audit daemon
#

local_events = yes
write_logs = yes
log_file = /var/log/audit/audit.log
log_group = adm
log_format = ENRICHED
flush = INCREMENTAL_ASYNC
freq = 50
max_log_file = 8
num_logs = 5
priority_boost = 4
name_format = NONE
max_log_file_action = ROTATE
space_left = 75
space_left_action = SYSLOG
";

/// Executor that records every command instead of running it.
///
/// Unscripted commands succeed with empty output; `auditctl -l` lists one
/// rule and `sysctl -n <key>` echoes the desired value back, so a full run
/// verifies cleanly unless a test scripts otherwise.
#[derive(Debug)]
pub struct RecordingExecutor {
    responses: Mutex<HashMap<String, ExecResult>>,
    calls: Mutex<Vec<String>>,
    sysctl_values: HashMap<String, String>,
    which_result: bool,
    cancel_on: Option<(String, Arc<AtomicBool>)>,
}

impl RecordingExecutor {
    /// An executor that answers `sysctl -n` from `config`.
    pub fn for_config(config: &ResolvedConfig) -> Self {
        let params = hardening_engine::resources::sysctl::ParameterSet::with_overrides(
            &config.sysctl.parameters,
        );
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            sysctl_values: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            which_result: true,
            cancel_on: None,
        }
    }

    /// Raise `flag` whenever `program` runs, as a Ctrl-C mid-run would.
    pub fn cancelling_on(mut self, program: &str, flag: Arc<AtomicBool>) -> Self {
        self.cancel_on = Some((program.to_string(), flag));
        self
    }

    /// Make `which()` report every program as missing.
    pub fn without_tools(mut self) -> Self {
        self.which_result = false;
        self
    }

    /// Answer `command` with a non-zero exit and `stderr`.
    pub fn fail(&self, command: &str, stderr: &str) {
        self.responses.lock().unwrap().insert(
            command.to_string(),
            ExecResult {
                stdout: String::new(),
                stderr: stderr.to_string(),
                success: false,
                code: Some(1),
            },
        );
    }

    /// Rendered commands executed so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

fn ok(stdout: &str) -> ExecResult {
    ExecResult {
        stdout: stdout.to_string(),
        stderr: String::new(),
        success: true,
        code: Some(0),
    }
}

impl Executor for RecordingExecutor {
    fn execute(&self, spec: &CommandSpec) -> Result<ExecResult, CommandError> {
        let rendered = spec.to_string();
        self.calls.lock().unwrap().push(rendered.clone());
        if let Some((program, flag)) = &self.cancel_on
            && *program == spec.program
        {
            flag.store(true, Ordering::SeqCst);
        }
        if let Some(result) = self.responses.lock().unwrap().get(&rendered) {
            return Ok(result.clone());
        }
        Ok(match (spec.program.as_str(), spec.args.as_slice()) {
            ("auditctl", [flag]) if flag == "-l" => ok("-w /etc/passwd -p wa -k identity\n"),
            ("sysctl", [flag, key]) if flag == "-n" => {
                ok(&format!("{}\n", self.sysctl_values.get(key).map_or("", String::as_str)))
            }
            _ => ok(""),
        })
    }

    fn which(&self, _: &str) -> bool {
        self.which_result
    }
}

/// An isolated root holding every managed file, backup and report.
pub struct Fixture {
    /// Temporary directory; deleted on drop.
    pub root: tempfile::TempDir,
}

impl Fixture {
    /// Create an empty fixture.
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().expect("create temp dir"),
        }
    }

    /// `rel` under the fixture root.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.path().join(rel)
    }

    /// Write `content` to `rel`, creating parents.
    pub fn seed(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.path(rel);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("create parent");
        std::fs::write(&path, content).expect("seed file");
        path
    }

    /// Read `rel` as a string.
    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.path(rel)).expect("read file")
    }

    /// Files directly inside `rel`, sorted; empty if it does not exist.
    pub fn list(&self, rel: &str) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.path(rel)) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .map(|e| e.expect("dir entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Defaults with every path under the fixture root, then `overlay`.
    pub fn config(&self, overlay: Value) -> ResolvedConfig {
        let p = |rel: &str| self.path(rel).to_string_lossy().into_owned();
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
        ResolvedConfig::from_document(&doc).expect("valid test config")
    }

    /// Seed the stock daemon configs.
    pub fn seed_stock(&self) {
        self.seed("etc/ssh/sshd_config", SSHD_CONFIG);
        self.seed("etc/audit/auditd.conf", AUDITD_CONF);
    }
}

/// A run context over `config` and `executor`, with the log it writes to.
pub fn context(
    config: ResolvedConfig,
    executor: Arc<dyn Executor>,
) -> (Context, Arc<BufferedLog>) {
    let log = Arc::new(BufferedLog::new());
    let ctx = Context::new(Arc::new(config), Arc::clone(&log) as Arc<dyn Log>, executor);
    (ctx, log)
}

/// Every regular file under `dir`, relative, with its content.
pub fn tree(dir: &Path) -> Vec<(String, String)> {
    fn walk(base: &Path, dir: &Path, out: &mut Vec<(String, String)>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries {
            let path = entry.expect("dir entry").path();
            if path.is_dir() {
                walk(base, &path, out);
            } else {
                let rel = path.strip_prefix(base).expect("under base");
                out.push((
                    rel.to_string_lossy().into_owned(),
                    std::fs::read_to_string(&path).unwrap_or_default(),
                ));
            }
        }
    }
    let mut out = Vec::new();
    walk(dir, dir, &mut out);
    out.sort();
    out
}
