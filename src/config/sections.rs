//! Typed views over the merged desired-state document.
//!
//! Directive and parameter maps accept strings, numbers and booleans as
//! values; all of them are rendered as strings because that is what ends up
//! in the target file.
use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Ordered `(name, value)` pairs as they appear in the document.
pub type OrderedPairs = Vec<(String, String)>;

fn scalar_to_string<E: de::Error>(key: &str, value: Value) -> Result<String, E> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(E::custom(format!(
            "value for '{key}' must be a string, number or boolean, got {other}"
        ))),
    }
}

/// Deserialize a JSON object of scalars, keeping document order.
///
/// Names are trimmed; a blank name is rejected since it would match every
/// line of the target file.
fn ordered_scalar_map<'de, D: Deserializer<'de>>(deserializer: D) -> Result<OrderedPairs, D::Error> {
    let map = Map::<String, Value>::deserialize(deserializer)?;
    map.into_iter()
        .map(|(k, v)| -> Result<(String, String), D::Error> {
            let name = k.trim();
            if name.is_empty() {
                return Err(de::Error::custom("setting names must not be blank"));
            }
            scalar_to_string(name, v).map(|v| (name.to_string(), v))
        })
        .collect()
}

/// Deserialize a JSON object of scalars into a key-sorted map.
fn sorted_scalar_map<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, String>, D::Error> {
    Ok(ordered_scalar_map(deserializer)?.into_iter().collect())
}

/// Top-level switches and shared paths.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneralSection {
    /// Simulate every mutation.
    pub dry_run: bool,
    /// Snapshot files before their first mutation.
    pub backup_configs: bool,
    /// Directory receiving `.bak` snapshots.
    pub backup_dir: PathBuf,
    /// Directory receiving step reports.
    pub report_dir: PathBuf,
    /// Per-command timeout in seconds; `0` disables the bound.
    pub command_timeout_secs: u64,
    /// Accounts written to the SSH `AllowUsers` directive.
    pub ssh_allowed_users: Vec<String>,
    /// Replacement audit rule list; `None` keeps the built-in list.
    #[serde(default)]
    pub audit_rules: Option<Vec<String>>,
}

/// Per-step driver settings (`steps.<id>`).
///
/// Fields left out of a `steps.<id>` entry take their [`Default`] value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StepSettings {
    /// Whether the step runs at all.
    pub enabled: bool,
    /// Stop at the first failed task instead of running the rest.
    pub abort_on_first_failure: bool,
}

impl Default for StepSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            abort_on_first_failure: false,
        }
    }
}

/// SSH daemon target.
#[derive(Debug, Clone, Deserialize)]
pub struct SshSection {
    /// Path to `sshd_config`.
    pub config_path: PathBuf,
    /// Login banner written when missing.
    pub banner_path: PathBuf,
    /// systemd unit restarted after a validated change.
    pub service: String,
    /// Desired directives in document order.
    #[serde(deserialize_with = "ordered_scalar_map")]
    pub directives: OrderedPairs,
}

/// Kernel parameter target.
#[derive(Debug, Clone, Deserialize)]
pub struct SysctlSection {
    /// Generated drop-in file.
    pub config_path: PathBuf,
    /// Overrides layered on top of the built-in parameter set.
    #[serde(deserialize_with = "sorted_scalar_map")]
    pub parameters: BTreeMap<String, String>,
    /// Kernel modules loaded before applying (missing modules only warn).
    pub load_modules: Vec<String>,
    /// Read every parameter back after applying.
    pub verify: bool,
}

/// Audit daemon target.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditdSection {
    /// Path to `auditd.conf`.
    pub config_path: PathBuf,
    /// Desired settings in document order.
    #[serde(deserialize_with = "ordered_scalar_map")]
    pub settings: OrderedPairs,
}

/// Audit rule target.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditSection {
    /// Generated rules file.
    pub rules_path: PathBuf,
}

/// System log routing target.
#[derive(Debug, Clone, Deserialize)]
pub struct RsyslogSection {
    /// Generated `rsyslog.d` drop-in.
    pub config_path: PathBuf,
    /// systemd unit restarted after the drop-in changes.
    pub service: String,
}
