//! `rsyslog.d` drop-in routing each facility to its own log file.
//!
//! The file is fully regenerated. Rendering is deterministic so an
//! unchanged host compares equal and is never rewritten.

const FILE_HEADER: &str = "\
# Enhanced system logging
# Managed by harden; local edits are replaced on the next run.
";

/// Facility selectors and their destination files, in file order.
pub const ROUTES: &[(&str, &str, &str)] = &[
    ("Log authentication events", "auth,authpriv.*", "/var/log/auth.log"),
    ("Log cron events", "cron.*", "/var/log/cron.log"),
    ("Log kernel messages", "kern.*", "/var/log/kern.log"),
    ("Log mail events", "mail.*", "/var/log/mail.log"),
    ("Log user-level messages", "user.*", "/var/log/user.log"),
    ("Log daemon messages", "daemon.*", "/var/log/daemon.log"),
    (
        "Log local facilities",
        "local0,local1,local2,local3,local4,local5,local6,local7.*",
        "/var/log/local.log",
    ),
];

/// Rotation, ownership and format directives written after the routes.
pub const DIRECTIVES: &[(&str, &[&str])] = &[
    (
        "Rotate daily and keep a week",
        &["$DailyRotateFiles on", "$DailyRotateCount 7"],
    ),
    (
        "Log file ownership and permissions",
        &[
            "$FileOwner root",
            "$FileGroup adm",
            "$FileCreateMode 0640",
            "$DirCreateMode 0755",
        ],
    ),
    (
        "Traditional timestamp format",
        &["$ActionFileDefaultTemplate RSYSLOG_TraditionalFileFormat"],
    ),
];

/// Selectors are padded to this width; a space always follows.
const SELECTOR_WIDTH: usize = 31;

/// Render the complete drop-in.
///
/// # Examples
///
/// ```
/// use hardening_engine::resources::rsyslog;
///
/// let text = rsyslog::render();
/// assert!(text.contains("auth,authpriv.*"));
/// assert!(text.ends_with("RSYSLOG_TraditionalFileFormat\n"));
/// ```
#[must_use]
pub fn render() -> String {
    let mut out = String::from(FILE_HEADER);
    for (comment, selector, target) in ROUTES {
        out.push_str(&format!(
            "\n# {comment}\n{selector:<width$} {target}\n",
            width = SELECTOR_WIDTH
        ));
    }
    for (comment, lines) in DIRECTIVES {
        out.push_str(&format!("\n# {comment}\n"));
        for line in *lines {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn render_is_stable() {
        assert_eq!(render(), render());
    }

    #[test]
    fn every_route_is_one_line() {
        let text = render();
        for (_, selector, target) in ROUTES {
            let line = text
                .lines()
                .find(|l| l.starts_with(selector))
                .unwrap();
            assert!(line.ends_with(target), "{line}");
            assert_eq!(line.split_whitespace().count(), 2, "{line}");
        }
    }

    #[test]
    fn short_selectors_are_aligned() {
        let text = render();
        let auth = text.lines().find(|l| l.starts_with("auth,")).unwrap();
        let cron = text.lines().find(|l| l.starts_with("cron.")).unwrap();
        assert_eq!(auth.find('/'), Some(SELECTOR_WIDTH + 1));
        assert_eq!(cron.find('/'), Some(SELECTOR_WIDTH + 1));
    }

    #[test]
    fn files_are_not_world_readable() {
        assert!(render().contains("\n$FileCreateMode 0640\n"));
    }
}
