//! Built-in desired state.
//!
//! Every key the engine reads is present here, so the merged document always
//! deserializes without relying on per-field serde defaults. User override
//! documents only need to carry the keys they change.
use serde_json::{Value, json};

/// The default desired-state document.
///
/// Kernel parameters are not listed here: their defaults live with the
/// generator in [`crate::resources::sysctl::DEFAULT_PARAMETERS`] and
/// `sysctl.parameters` only carries overrides.
#[must_use]
pub fn default_document() -> Value {
    json!({
        "dry_run": false,
        "backup_configs": true,
        "backup_dir": "/var/backups/hardening_tool",
        "report_dir": "results",
        "command_timeout_secs": 300,
        "ssh_allowed_users": [],
        "steps": {
            "ssh": { "enabled": true, "abort_on_first_failure": true },
            "sysctl": { "enabled": true, "abort_on_first_failure": false },
            "audit": { "enabled": true, "abort_on_first_failure": false }
        },
        "ssh": {
            "config_path": "/etc/ssh/sshd_config",
            "banner_path": "/etc/issue.net",
            "service": "ssh",
            "directives": {
                "PermitRootLogin": "no",
                "PermitEmptyPasswords": "no",
                "ChallengeResponseAuthentication": "no",
                "UsePAM": "yes",
                "X11Forwarding": "no",
                "Protocol": "2",
                "MaxAuthTries": "3",
                "ClientAliveInterval": "300",
                "ClientAliveCountMax": "0",
                "LoginGraceTime": "60",
                "Banner": "/etc/issue.net",
                "PasswordAuthentication": "no"
            }
        },
        "sysctl": {
            "config_path": "/etc/sysctl.d/99-hardening.conf",
            "parameters": {},
            "load_modules": ["br_netfilter"],
            "verify": true
        },
        "auditd": {
            "config_path": "/etc/audit/auditd.conf",
            "settings": {
                "max_log_file": "100",
                "num_logs": "5",
                "space_left_action": "email",
                "action_mail_acct": "root",
                "admin_space_left_action": "halt",
                "max_log_file_action": "rotate",
                "log_format": "RAW",
                "flush": "INCREMENTAL_ASYNC",
                "freq": "50",
                "priority_boost": "4",
                "disp_qos": "lossy",
                "dispatcher": "/sbin/audispd",
                "name_format": "HOSTNAME",
                "local_events": "yes",
                "write_logs": "yes",
                "log_file": "/var/log/audit/audit.log",
                "log_group": "adm"
            }
        },
        "audit": {
            "rules_path": "/etc/audit/rules.d/99-hardening.rules"
        },
        "rsyslog": {
            "config_path": "/etc/rsyslog.d/99-hardening.conf",
            "service": "rsyslog"
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_document_is_an_object() {
        assert!(default_document().is_object());
    }

    #[test]
    fn every_default_step_is_configured() {
        let doc = default_document();
        for id in ["ssh", "sysctl", "audit"] {
            assert!(doc["steps"][id]["enabled"].is_boolean(), "steps.{id}");
        }
    }

    #[test]
    fn ssh_directives_keep_declared_order() {
        let doc = default_document();
        let first = doc["ssh"]["directives"]
            .as_object()
            .and_then(|m| m.keys().next().cloned());
        assert_eq!(first.as_deref(), Some("PermitRootLogin"));
    }

    #[test]
    fn audit_rule_override_is_absent_by_default() {
        assert!(default_document().get("audit_rules").is_none());
    }
}
