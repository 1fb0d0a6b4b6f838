//! Layered desired-state configuration.
//!
//! Built-in defaults are deep-merged with an optional JSON override document,
//! then the CLI dry-run flag is applied last. The result is an immutable
//! [`ResolvedConfig`] shared by every step in the run.
pub mod defaults;
pub mod merge;
pub mod sections;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ConfigLoadError;
use crate::logging::Log;
use crate::resources::audit_rules::RuleSet;
use sections::{
    AuditSection, AuditdSection, GeneralSection, RsyslogSection, SshSection, StepSettings,
    SysctlSection,
};

/// Fully resolved configuration for one run.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Top-level switches (`dry_run`, `backup_configs`, paths).
    pub general: GeneralSection,
    /// Per-step driver settings keyed by step id.
    pub steps: BTreeMap<String, StepSettings>,
    /// SSH daemon target.
    pub ssh: SshSection,
    /// Kernel parameter target.
    pub sysctl: SysctlSection,
    /// Audit daemon target.
    pub auditd: AuditdSection,
    /// Audit rule target.
    pub audit: AuditSection,
    /// System log routing target.
    pub rsyslog: RsyslogSection,
    /// Override document that was merged in, if any.
    pub source: Option<PathBuf>,
}

fn section<T: DeserializeOwned>(doc: &Value, name: &str) -> Result<T, ConfigLoadError> {
    let value = doc.get(name).cloned().unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|source| ConfigLoadError::InvalidSection {
        section: name.to_string(),
        source,
    })
}

/// Read an override document.
///
/// `Ok(None)` means the file is absent.
fn read_override(path: &Path) -> Result<Option<Value>, ConfigLoadError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigLoadError::Unreadable {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let value: Value =
        serde_json::from_str(&content).map_err(|source| ConfigLoadError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
    if !value.is_object() {
        return Err(ConfigLoadError::NotAnObject {
            path: path.to_path_buf(),
        });
    }
    Ok(Some(value))
}

impl ResolvedConfig {
    /// Build a configuration from a complete document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigLoadError::InvalidSection`] naming the first section
    /// whose shape does not match.
    pub fn from_document(doc: &Value) -> Result<Self, ConfigLoadError> {
        Ok(Self {
            general: serde_json::from_value(doc.clone()).map_err(|source| {
                ConfigLoadError::InvalidSection {
                    section: "general".to_string(),
                    source,
                }
            })?,
            steps: section(doc, "steps")?,
            ssh: section(doc, "ssh")?,
            sysctl: section(doc, "sysctl")?,
            auditd: section(doc, "auditd")?,
            audit: section(doc, "audit")?,
            rsyslog: section(doc, "rsyslog")?,
            source: None,
        })
    }

    /// Resolve `defaults ← user override ← dry-run flag`.
    ///
    /// A missing, malformed or ill-shaped override document is logged as a
    /// warning and the defaults are used alone; it is never fatal.
    /// `dry_run_override` is the CLI flag: `Some(true)` forces dry-run
    /// regardless of the documents.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigLoadError::Unreadable`] if the override exists but
    /// cannot be read, and [`ConfigLoadError::InvalidSection`] if the
    /// defaults themselves are ill-shaped.
    pub fn resolve(
        defaults: Value,
        user_path: Option<&Path>,
        dry_run_override: Option<bool>,
        log: &dyn Log,
    ) -> Result<Self, ConfigLoadError> {
        let mut resolved = None;

        if let Some(path) = user_path {
            match read_override(path) {
                Ok(None) => log.warn(&format!(
                    "config file {} not found, using defaults",
                    path.display()
                )),
                Ok(Some(overlay)) => {
                    let mut merged = defaults.clone();
                    merge::deep_merge(&mut merged, overlay);
                    match Self::from_document(&merged) {
                        Ok(mut config) => {
                            log.info(&format!("loaded configuration from {}", path.display()));
                            config.source = Some(path.to_path_buf());
                            resolved = Some(config);
                        }
                        Err(e) => log.warn(&format!("{e}; using defaults")),
                    }
                }
                Err(e @ ConfigLoadError::Unreadable { .. }) => return Err(e),
                Err(e) => log.warn(&format!("{e}; using defaults")),
            }
        }

        let mut config = match resolved {
            Some(config) => config,
            None => Self::from_document(&defaults)?,
        };
        if let Some(dry_run) = dry_run_override {
            config.general.dry_run = dry_run;
        }
        Ok(config)
    }

    /// [`resolve`](Self::resolve) against the built-in defaults.
    ///
    /// # Errors
    ///
    /// Same as [`resolve`](Self::resolve).
    pub fn load(
        user_path: Option<&Path>,
        dry_run_override: Option<bool>,
        log: &dyn Log,
    ) -> Result<Self, ConfigLoadError> {
        Self::resolve(defaults::default_document(), user_path, dry_run_override, log)
    }

    /// Whether every mutation is simulated.
    #[must_use]
    pub const fn dry_run(&self) -> bool {
        self.general.dry_run
    }

    /// Whether files are snapshotted before their first mutation.
    #[must_use]
    pub const fn backups_enabled(&self) -> bool {
        self.general.backup_configs
    }

    /// Default bound for external commands, `None` when disabled.
    #[must_use]
    pub const fn command_timeout(&self) -> Option<Duration> {
        match self.general.command_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Settings for step `id`; unknown ids get [`StepSettings::default`].
    #[must_use]
    pub fn step(&self, id: &str) -> StepSettings {
        self.steps.get(id).copied().unwrap_or_default()
    }

    /// The audit rule list to write: the user override in its entirety if
    /// present, else the built-in list.
    #[must_use]
    pub fn rule_set(&self) -> RuleSet {
        self.general
            .audit_rules
            .clone()
            .map_or(RuleSet::BuiltIn, RuleSet::UserOverride)
    }
}
