//! Ordered audit rule files.
//!
//! The file is a fixed preamble, the rules verbatim, then the immutability
//! trailer. The rule list is either the built-in one or the user's list,
//! never a mix of the two.

/// Delete existing rules, set the backlog buffer, set failure mode.
pub const PREAMBLE: [&str; 3] = ["-D", "-b 8192", "-f 1"];

/// Lock the rule set until reboot.
pub const TRAILER: &str = "-e 2";

/// Built-in rules (CIS-style watches and syscall audits).
pub const DEFAULT_RULES: &[&str] = &[
    // time changes
    "-a always,exit -F arch=b64 -S adjtimex -S settimeofday -k time-change",
    "-a always,exit -F arch=b32 -S adjtimex -S settimeofday -S stime -k time-change",
    "-a always,exit -F arch=b64 -S clock_settime -k time-change",
    "-a always,exit -F arch=b32 -S clock_settime -k time-change",
    "-w /etc/localtime -p wa -k time-change",
    // identity
    "-w /etc/group -p wa -k identity",
    "-w /etc/passwd -p wa -k identity",
    "-w /etc/gshadow -p wa -k identity",
    "-w /etc/shadow -p wa -k identity",
    "-w /etc/security/opasswd -p wa -k identity",
    // network environment
    "-a always,exit -F arch=b64 -S sethostname -S setdomainname -k system-locale",
    "-a always,exit -F arch=b32 -S sethostname -S setdomainname -k system-locale",
    "-w /etc/issue -p wa -k system-locale",
    "-w /etc/issue.net -p wa -k system-locale",
    "-w /etc/hosts -p wa -k system-locale",
    "-w /etc/network -p wa -k system-locale",
    // privilege use
    "-w /var/log/sudo.log -p wa -k actions",
    "-w /etc/sudoers -p wa -k scope",
    "-w /etc/sudoers.d/ -p wa -k scope",
    // logins
    "-w /var/log/faillog -p wa -k logins",
    "-w /var/log/lastlog -p wa -k logins",
    "-w /var/log/tallylog -p wa -k logins",
    // init
    "-w /etc/init.d/ -p wa -k init",
    "-w /etc/init/ -p wa -k init",
    "-w /etc/inittab -p wa -k init",
    // library search paths
    "-w /etc/ld.so.conf -p wa -k libpath",
    "-w /etc/ld.so.conf.d/ -p wa -k libpath",
    // kernel modules
    "-w /sbin/insmod -p x -k modules",
    "-w /sbin/rmmod -p x -k modules",
    "-w /sbin/modprobe -p x -k modules",
    "-a always,exit -F arch=b64 -S init_module -S delete_module -k modules",
    // mounts
    "-a always,exit -F arch=b64 -S mount -k mounts",
    "-a always,exit -F arch=b32 -S mount -k mounts",
    // deletions
    "-a always,exit -F arch=b64 -S unlink -S unlinkat -S rename -S renameat -k delete",
    "-a always,exit -F arch=b32 -S unlink -S unlinkat -S rename -S renameat -k delete",
    // MAC policy
    "-w /etc/selinux/ -p wa -k MAC-policy",
    "-w /usr/share/selinux/ -p wa -k MAC-policy",
    // boot loader and scheduled jobs
    "-w /boot/grub/grub.cfg -p wa -k grub",
    "-w /etc/crontab -p wa -k cron",
    "-w /etc/cron.hourly/ -p wa -k cron",
    "-w /etc/cron.daily/ -p wa -k cron",
    "-w /etc/cron.weekly/ -p wa -k cron",
    "-w /etc/cron.monthly/ -p wa -k cron",
    "-w /etc/cron.d/ -p wa -k cron",
    "-w /var/spool/cron/crontabs/ -p wa -k cron",
];

/// The rules to write.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RuleSet {
    /// [`DEFAULT_RULES`].
    #[default]
    BuiltIn,
    /// A user-supplied list that replaces the built-in one entirely.
    UserOverride(Vec<String>),
}

impl RuleSet {
    /// The rules in write order.
    #[must_use]
    pub fn rules(&self) -> Vec<&str> {
        match self {
            Self::BuiltIn => DEFAULT_RULES.to_vec(),
            Self::UserOverride(rules) => rules.iter().map(String::as_str).collect(),
        }
    }

    /// Number of rules (excluding preamble and trailer).
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::BuiltIn => DEFAULT_RULES.len(),
            Self::UserOverride(rules) => rules.len(),
        }
    }

    /// Whether there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short label for logs.
    #[must_use]
    pub const fn source(&self) -> &'static str {
        match self {
            Self::BuiltIn => "built-in",
            Self::UserOverride(_) => "user override",
        }
    }
}

/// Render the complete rules file.
///
/// # Examples
///
/// ```
/// use hardening_engine::resources::audit_rules::{generate, RuleSet};
///
/// let text = generate(&RuleSet::UserOverride(vec!["-w /etc/hosts -p wa".into()]));
/// assert_eq!(text, "-D\n-b 8192\n-f 1\n-w /etc/hosts -p wa\n-e 2\n");
/// ```
#[must_use]
pub fn generate(rule_set: &RuleSet) -> String {
    let mut lines: Vec<&str> = PREAMBLE.to_vec();
    lines.extend(rule_set.rules());
    lines.push(TRAILER);

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
