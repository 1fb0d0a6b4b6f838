//! Category-grouped `key=value` kernel parameter files.
//!
//! The file is always regenerated in full from the merged parameter set;
//! whatever was there before is never read or preserved.
use std::collections::BTreeMap;
use std::fmt;

/// Built-in hardening parameters.
pub const DEFAULT_PARAMETERS: &[(&str, &str)] = &[
    ("net.ipv4.ip_forward", "1"),
    ("net.ipv4.conf.all.rp_filter", "1"),
    ("net.ipv4.conf.default.rp_filter", "1"),
    ("net.ipv4.conf.all.accept_source_route", "0"),
    ("net.ipv4.conf.default.accept_source_route", "0"),
    ("net.ipv4.conf.all.accept_redirects", "0"),
    ("net.ipv4.conf.default.accept_redirects", "0"),
    ("net.ipv4.conf.all.secure_redirects", "0"),
    ("net.ipv4.conf.default.secure_redirects", "0"),
    ("net.ipv4.conf.all.send_redirects", "0"),
    ("net.ipv4.conf.default.send_redirects", "0"),
    ("net.ipv4.icmp_echo_ignore_broadcasts", "1"),
    ("net.ipv4.icmp_ignore_bogus_error_responses", "1"),
    ("net.ipv4.tcp_syncookies", "1"),
    ("net.ipv6.conf.all.disable_ipv6", "1"),
    ("net.ipv6.conf.default.disable_ipv6", "1"),
    ("net.ipv6.conf.lo.disable_ipv6", "1"),
    ("kernel.kptr_restrict", "1"),
    ("kernel.dmesg_restrict", "1"),
    ("kernel.yama.ptrace_scope", "1"),
    ("fs.protected_hardlinks", "1"),
    ("fs.protected_symlinks", "1"),
    ("fs.suid_dumpable", "0"),
    ("vm.mmap_min_addr", "65536"),
    ("net.bridge.bridge-nf-call-iptables", "1"),
    ("net.bridge.bridge-nf-call-ip6tables", "1"),
];

const FILE_HEADER: &str = "\
# Kernel and network parameter hardening
# Managed by harden; local edits are replaced on the next run.
";

/// Section a parameter is written under, derived from its first key segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    /// `net.*`
    Net,
    /// `kernel.*`
    Kernel,
    /// `fs.*`
    Fs,
    /// `vm.*`
    Vm,
    /// Anything else; never dropped.
    Other,
}

impl Category {
    /// Render order.
    pub const ALL: [Self; 5] = [Self::Net, Self::Kernel, Self::Fs, Self::Vm, Self::Other];

    /// Classify a dotted parameter key.
    ///
    /// # Examples
    ///
    /// ```
    /// use hardening_engine::resources::sysctl::Category;
    ///
    /// assert_eq!(Category::of("net.ipv4.ip_forward"), Category::Net);
    /// assert_eq!(Category::of("custom.param"), Category::Other);
    /// assert_eq!(Category::of("network.x"), Category::Other);
    /// ```
    #[must_use]
    pub fn of(key: &str) -> Self {
        match key.split('.').next() {
            Some("net") => Self::Net,
            Some("kernel") => Self::Kernel,
            Some("fs") => Self::Fs,
            Some("vm") => Self::Vm,
            _ => Self::Other,
        }
    }

    const fn heading(self) -> (&'static str, &'static str) {
        match self {
            Self::Net => (
                "Network Parameters",
                "Configure network security and routing",
            ),
            Self::Kernel => (
                "Kernel Security Parameters",
                "Restrict kernel information exposure",
            ),
            Self::Fs => (
                "File System Security Parameters",
                "Protect against symlink and hardlink attacks",
            ),
            Self::Vm => ("Virtual Memory Parameters", "Memory management security"),
            Self::Other => (
                "Other Parameters",
                "Keys outside the net, kernel, fs and vm namespaces",
            ),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Net => "net",
            Self::Kernel => "kernel",
            Self::Fs => "fs",
            Self::Vm => "vm",
            Self::Other => "other",
        })
    }
}

/// Merged kernel parameters, sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSet {
    params: BTreeMap<String, String>,
}

impl ParameterSet {
    /// `defaults` with every key of `overrides` replacing or adding a value.
    ///
    /// Keys match case-sensitively.
    #[must_use]
    pub fn merged<'d, 'o, D, O>(defaults: D, overrides: O) -> Self
    where
        D: IntoIterator<Item = (&'d str, &'d str)>,
        O: IntoIterator<Item = (&'o String, &'o String)>,
    {
        let mut params: BTreeMap<String, String> = defaults
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        for (k, v) in overrides {
            params.insert(k.clone(), v.clone());
        }
        Self { params }
    }

    /// [`DEFAULT_PARAMETERS`] with `overrides` applied.
    #[must_use]
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Self {
        Self::merged(DEFAULT_PARAMETERS.iter().copied(), overrides)
    }

    /// Desired value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// All parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parameters grouped by [`Category`], each group in key order.
    #[must_use]
    pub fn by_category(&self) -> BTreeMap<Category, Vec<(&str, &str)>> {
        let mut groups: BTreeMap<Category, Vec<(&str, &str)>> = BTreeMap::new();
        for (k, v) in self.iter() {
            groups.entry(Category::of(k)).or_default().push((k, v));
        }
        groups
    }

    /// Render the complete file. Empty categories are omitted.
    #[must_use]
    pub fn render(&self) -> String {
        let groups = self.by_category();
        let mut out = String::from(FILE_HEADER);
        for category in Category::ALL {
            let Some(entries) = groups.get(&category) else {
                continue;
            };
            let (title, blurb) = category.heading();
            out.push_str(&format!("\n# {title}\n# {blurb}\n"));
            for (k, v) in entries {
                out.push_str(&format!("{k}={v}\n"));
            }
        }
        out
    }
}

/// Merge `overrides` over `defaults` and render the file.
#[must_use]
pub fn generate(defaults: &[(&str, &str)], overrides: &BTreeMap<String, String>) -> String {
    ParameterSet::merged(defaults.iter().copied(), overrides).render()
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn overrides(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|&(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn section<'a>(text: &'a str, title: &str) -> Vec<&'a str> {
        text.split("\n\n")
            .find(|block| block.starts_with(&format!("# {title}")))
            .map(|block| block.lines().filter(|l| !l.starts_with('#')).collect())
            .unwrap_or_default()
    }

    #[test]
    fn override_wins_and_unknown_prefix_lands_in_other() {
        let text = generate(
            &[("net.ipv4.ip_forward", "1")],
            &overrides(&[("net.ipv4.ip_forward", "0"), ("custom.param", "5")]),
        );
        assert_eq!(section(&text, "Network Parameters"), ["net.ipv4.ip_forward=0"]);
        assert_eq!(section(&text, "Other Parameters"), ["custom.param=5"]);
    }

    #[test]
    fn every_key_appears_exactly_once() {
        let o = overrides(&[("kernel.sysrq", "0"), ("abi.vsyscall32", "0"), ("vm.mmap_min_addr", "4096")]);
        let set = ParameterSet::with_overrides(&o);
        let text = set.render();
        for (k, v) in set.iter() {
            let line = format!("{k}={v}");
            assert_eq!(
                text.lines().filter(|l| *l == line).count(),
                1,
                "{line} should appear once"
            );
        }
        let kv_lines = text.lines().filter(|l| l.contains('=')).count();
        assert_eq!(kv_lines, set.len());
    }

    #[test]
    fn defaults_kept_where_not_overridden() {
        let set = ParameterSet::with_overrides(&overrides(&[("fs.suid_dumpable", "2")]));
        assert_eq!(set.get("fs.suid_dumpable"), Some("2"));
        assert_eq!(set.get("kernel.kptr_restrict"), Some("1"));
        assert_eq!(set.len(), DEFAULT_PARAMETERS.len());
    }

    #[test]
    fn override_keys_are_case_sensitive() {
        let set = ParameterSet::merged(
            [("net.ipv4.ip_forward", "1")],
            &overrides(&[("NET.ipv4.ip_forward", "0")]),
        );
        assert_eq!(set.get("net.ipv4.ip_forward"), Some("1"));
        assert_eq!(Category::of("NET.ipv4.ip_forward"), Category::Other);
    }

    #[test]
    fn sections_follow_fixed_order_with_sorted_keys() {
        let text = generate(
            &[
                ("vm.b", "1"),
                ("fs.a", "1"),
                ("zz.top", "1"),
                ("kernel.z", "1"),
                ("kernel.a", "1"),
                ("net.z", "1"),
                ("net.a", "1"),
            ],
            &BTreeMap::new(),
        );
        let kv: Vec<&str> = text.lines().filter(|l| l.contains('=')).collect();
        assert_eq!(
            kv,
            ["net.a=1", "net.z=1", "kernel.a=1", "kernel.z=1", "fs.a=1", "vm.b=1", "zz.top=1"]
        );
    }

    #[test]
    fn empty_categories_are_omitted() {
        let text = generate(&[("net.a", "1")], &BTreeMap::new());
        assert!(!text.contains("Kernel Security"));
        assert!(!text.contains("Other Parameters"));
    }

    #[test]
    fn output_is_deterministic() {
        let o = overrides(&[("custom.param", "5")]);
        assert_eq!(
            ParameterSet::with_overrides(&o).render(),
            ParameterSet::with_overrides(&o).render()
        );
    }

    #[test]
    fn render_ends_with_single_newline() {
        let text = generate(&[("net.a", "1")], &BTreeMap::new());
        assert!(text.ends_with("net.a=1\n"));
        assert!(!text.ends_with("\n\n"));
    }

    #[test]
    fn category_display() {
        let names: Vec<String> = Category::ALL.iter().map(ToString::to_string).collect();
        assert_eq!(names, ["net", "kernel", "fs", "vm", "other"]);
    }
}
