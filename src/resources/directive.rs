//! Reconcile named directives against a line-oriented config file.
//!
//! Matching is by case-insensitive prefix of the trimmed line, and the first
//! directive in caller order wins. A directive whose name is a prefix of
//! another (`max_log_file` / `max_log_file_action`) must therefore come
//! after the longer one; [`order_most_specific_first`] arranges that.
//!
//! Only the first line per directive is rewritten. Later duplicates are
//! copied through untouched rather than removed.
use std::fmt;
use std::path::Path;

use crate::logging::Log;
use crate::resources::error::ResourceError;
use crate::resources::fs::{self, WriteOutcome};

/// A named setting rendered as a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    /// Directive name as written to the file.
    pub name: String,
    /// Desired value.
    pub value: String,
}

impl Directive {
    /// Create a directive. Surrounding whitespace in `name` is dropped.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        let name: String = name.into();
        Self {
            name: name.trim().to_string(),
            value: value.into(),
        }
    }

    /// Case-insensitive prefix match against an already trimmed line.
    fn matches(&self, trimmed: &str) -> bool {
        trimmed
            .get(..self.name.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(&self.name))
    }
}

/// Line syntax of the target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirectiveStyle {
    /// `name value` (`sshd_config`).
    #[default]
    Space,
    /// `name = value` (`auditd.conf`).
    Equals,
}

impl DirectiveStyle {
    /// Canonical line for `directive`, without a line terminator.
    #[must_use]
    pub fn render(self, directive: &Directive) -> String {
        match self {
            Self::Space => format!("{} {}", directive.name, directive.value),
            Self::Equals => format!("{} = {}", directive.name, directive.value),
        }
    }
}

/// Output of [`patch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchResult {
    /// Full new file content.
    pub content: String,
    /// Directives that replaced an existing line, in file order.
    pub updated: Vec<String>,
    /// Directives appended at the end, in caller order.
    pub appended: Vec<String>,
}

impl PatchResult {
    /// Every directive name that is now present, updated ones first.
    #[must_use]
    pub fn applied_names(&self) -> Vec<&str> {
        self.updated
            .iter()
            .chain(&self.appended)
            .map(String::as_str)
            .collect()
    }
}

impl fmt::Display for PatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} updated, {} appended",
            self.updated.len(),
            self.appended.len()
        )
    }
}

fn line_terminator(line: &str) -> &'static str {
    if line.ends_with("\r\n") {
        "\r\n"
    } else if line.ends_with('\n') {
        "\n"
    } else {
        ""
    }
}

/// Reconcile `directives` against `original`. Pure; performs no I/O.
///
/// Blank and `#` comment lines are copied verbatim. Any other line whose
/// trimmed text starts with a directive name (ASCII case-insensitive) is
/// replaced by that directive's canonical rendering, keeping the line's
/// terminator. Directives matching no line are appended in caller order.
///
/// # Examples
///
/// ```
/// use hardening_engine::resources::directive::{patch, Directive, DirectiveStyle};
///
/// let directives = [
///     Directive::new("PermitRootLogin", "no"),
///     Directive::new("PasswordAuthentication", "no"),
/// ];
/// let result = patch("#PasswordAuthentication yes\n", &directives, DirectiveStyle::Space);
/// assert_eq!(
///     result.content,
///     "#PasswordAuthentication yes\nPermitRootLogin no\nPasswordAuthentication no\n"
/// );
/// ```
#[must_use]
pub fn patch(original: &str, directives: &[Directive], style: DirectiveStyle) -> PatchResult {
    let mut content = String::with_capacity(original.len());
    let mut applied = vec![false; directives.len()];
    let mut updated = Vec::new();

    for line in original.split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            content.push_str(line);
            continue;
        }

        let hit = directives
            .iter()
            .zip(applied.iter_mut())
            .find(|(d, _)| d.matches(trimmed));
        match hit {
            Some((directive, done)) if !*done => {
                *done = true;
                content.push_str(&style.render(directive));
                content.push_str(line_terminator(line));
                updated.push(directive.name.clone());
            }
            _ => content.push_str(line),
        }
    }

    let mut appended = Vec::new();
    for (directive, done) in directives.iter().zip(&applied) {
        if *done {
            continue;
        }
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&style.render(directive));
        content.push('\n');
        appended.push(directive.name.clone());
    }

    PatchResult {
        content,
        updated,
        appended,
    }
}

/// Reorder so that no directive is preceded by one whose name is a
/// case-insensitive prefix of it. Otherwise caller order is kept.
#[must_use]
pub fn order_most_specific_first(directives: Vec<Directive>) -> Vec<Directive> {
    let mut ordered: Vec<Directive> = Vec::with_capacity(directives.len());
    for directive in directives {
        let pos = ordered
            .iter()
            .position(|placed| {
                placed.name.len() < directive.name.len() && placed.matches(&directive.name)
            })
            .unwrap_or(ordered.len());
        ordered.insert(pos, directive);
    }
    ordered
}

/// Write patched content to `path`, honouring dry-run.
///
/// # Errors
///
/// Returns [`ResourceError::PatchWriteFailure`] if the write fails.
pub fn write(
    path: &Path,
    content: &str,
    dry_run: bool,
    log: &dyn Log,
) -> Result<WriteOutcome, ResourceError> {
    fs::write_file(path, content, dry_run, log).map_err(|source| {
        ResourceError::PatchWriteFailure {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::logging::BufferedLog;

    fn ssh(pairs: &[(&str, &str)]) -> Vec<Directive> {
        pairs.iter().map(|&(n, v)| Directive::new(n, v)).collect()
    }

    #[test]
    fn commented_directive_is_preserved_and_appended() {
        let directives = ssh(&[("PermitRootLogin", "no"), ("PasswordAuthentication", "no")]);
        let result = patch("#PasswordAuthentication yes\n", &directives, DirectiveStyle::Space);
        assert_eq!(
            result.content,
            "#PasswordAuthentication yes\nPermitRootLogin no\nPasswordAuthentication no\n"
        );
        assert!(result.updated.is_empty());
        assert_eq!(result.appended, ["PermitRootLogin", "PasswordAuthentication"]);
    }

    #[test]
    fn existing_line_is_replaced_case_insensitively() {
        let original = "Port 22\npermitrootlogin yes\nUsePAM yes\n";
        let result = patch(original, &ssh(&[("PermitRootLogin", "no")]), DirectiveStyle::Space);
        assert_eq!(result.content, "Port 22\nPermitRootLogin no\nUsePAM yes\n");
        assert_eq!(result.updated, ["PermitRootLogin"]);
        assert!(result.appended.is_empty());
    }

    #[test]
    fn indented_line_is_matched_after_trimming() {
        let result = patch(
            "  MaxAuthTries 6\n",
            &ssh(&[("MaxAuthTries", "3")]),
            DirectiveStyle::Space,
        );
        assert_eq!(result.content, "MaxAuthTries 3\n");
    }

    #[test]
    fn patch_is_idempotent() {
        let original = "# header\n\nPort 22\nPermitRootLogin yes\n#Banner none\nX11Forwarding yes\nPermitRootLogin without-password\n";
        let directives = ssh(&[
            ("PermitRootLogin", "no"),
            ("X11Forwarding", "no"),
            ("Banner", "/etc/issue.net"),
            ("MaxAuthTries", "3"),
        ]);
        let once = patch(original, &directives, DirectiveStyle::Space);
        let twice = patch(&once.content, &directives, DirectiveStyle::Space);
        assert_eq!(once.content, twice.content);
    }

    #[test]
    fn padded_name_is_trimmed_and_stays_idempotent() {
        let directives = ssh(&[(" Port ", "22")]);
        let once = patch("", &directives, DirectiveStyle::Space);
        let twice = patch(&once.content, &directives, DirectiveStyle::Space);
        assert_eq!(once.content, "Port 22\n");
        assert_eq!(twice.content, once.content);
        assert_eq!(twice.updated, ["Port"]);
    }

    #[test]
    fn only_first_duplicate_is_updated() {
        let original = "PermitRootLogin yes\nPermitRootLogin prohibit-password\n";
        let result = patch(original, &ssh(&[("PermitRootLogin", "no")]), DirectiveStyle::Space);
        assert_eq!(
            result.content,
            "PermitRootLogin no\nPermitRootLogin prohibit-password\n"
        );
        assert_eq!(result.updated, ["PermitRootLogin"]);
    }

    #[test]
    fn comments_and_blank_lines_never_change() {
        let original = "#PermitRootLogin yes\n   # PermitRootLogin yes\n\n\t\n";
        let result = patch(original, &ssh(&[("PermitRootLogin", "no")]), DirectiveStyle::Space);
        assert!(result.content.starts_with(original));
    }

    #[test]
    fn missing_trailing_newline_is_completed_before_append() {
        let result = patch("Port 22", &ssh(&[("UsePAM", "yes")]), DirectiveStyle::Space);
        assert_eq!(result.content, "Port 22\nUsePAM yes\n");
    }

    #[test]
    fn replaced_last_line_without_newline_keeps_shape() {
        let result = patch("UsePAM no", &ssh(&[("UsePAM", "yes")]), DirectiveStyle::Space);
        assert_eq!(result.content, "UsePAM yes");
    }

    #[test]
    fn crlf_terminators_are_preserved() {
        let result = patch(
            "UsePAM no\r\nPort 22\r\n",
            &ssh(&[("UsePAM", "yes")]),
            DirectiveStyle::Space,
        );
        assert_eq!(result.content, "UsePAM yes\r\nPort 22\r\n");
    }

    #[test]
    fn empty_file_gets_every_directive() {
        let result = patch("", &ssh(&[("A", "1"), ("B", "2")]), DirectiveStyle::Space);
        assert_eq!(result.content, "A 1\nB 2\n");
    }

    #[test]
    fn first_match_wins_not_longest() {
        // "max_log_file" listed first swallows the "max_log_file_action" line.
        let directives = ssh(&[("max_log_file", "100"), ("max_log_file_action", "rotate")]);
        let result = patch("max_log_file_action = SYSLOG\n", &directives, DirectiveStyle::Equals);
        assert_eq!(
            result.content,
            "max_log_file = 100\nmax_log_file_action = rotate\n"
        );
    }

    #[test]
    fn most_specific_first_resolves_prefix_overlap() {
        let directives = order_most_specific_first(ssh(&[
            ("max_log_file", "100"),
            ("num_logs", "5"),
            ("max_log_file_action", "rotate"),
        ]));
        let names: Vec<&str> = directives.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["max_log_file_action", "max_log_file", "num_logs"]);

        let original = "max_log_file = 8\nmax_log_file_action = ROTATE\n";
        let result = patch(original, &directives, DirectiveStyle::Equals);
        assert_eq!(
            result.content,
            "max_log_file = 100\nmax_log_file_action = rotate\nnum_logs = 5\n"
        );
    }

    #[test]
    fn most_specific_first_keeps_unrelated_order() {
        let input = ssh(&[("B", "1"), ("A", "2"), ("C", "3")]);
        assert_eq!(order_most_specific_first(input.clone()), input);
    }

    #[test]
    fn equals_style_renders_spaced_assignment() {
        let d = Directive::new("num_logs", "5");
        assert_eq!(DirectiveStyle::Equals.render(&d), "num_logs = 5");
        assert_eq!(DirectiveStyle::Space.render(&d), "num_logs 5");
    }

    #[test]
    fn applied_names_lists_updated_then_appended() {
        let result = patch(
            "UsePAM no\n",
            &ssh(&[("Protocol", "2"), ("UsePAM", "yes")]),
            DirectiveStyle::Space,
        );
        assert_eq!(result.applied_names(), ["UsePAM", "Protocol"]);
        assert_eq!(result.to_string(), "1 updated, 1 appended");
    }

    #[test]
    fn write_dry_run_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sshd_config");
        std::fs::write(&path, "Port 22\n").unwrap();
        let log = BufferedLog::new();

        let outcome = write(&path, "Port 2222\n", true, &log).unwrap();

        assert_eq!(outcome, WriteOutcome::DryRun);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Port 22\n");
    }

    #[test]
    fn write_failure_is_typed() {
        let dir = tempfile::tempdir().unwrap();
        // Writing to a directory path fails.
        let err = write(dir.path(), "x", false, &BufferedLog::new()).unwrap_err();
        assert!(matches!(err, ResourceError::PatchWriteFailure { .. }));
    }
}
