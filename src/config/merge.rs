//! Layering of JSON documents.
use serde_json::Value;

/// Merge `overlay` into `base` in place.
///
/// Objects merge key by key, recursively. Everything else (scalars,
/// arrays, `null`) in `overlay` replaces the value in `base` wholesale, so a
/// user-supplied list never appends to the default list.
///
/// New keys keep the overlay's order and land after the base's keys.
///
/// # Examples
///
/// ```
/// use hardening_engine::config::merge::deep_merge;
/// use serde_json::json;
///
/// let mut base = json!({"ssh": {"a": "1", "b": "2"}, "rules": ["x", "y"]});
/// deep_merge(&mut base, json!({"ssh": {"b": "3"}, "rules": ["z"]}));
/// assert_eq!(base, json!({"ssh": {"a": "1", "b": "3"}, "rules": ["z"]}));
/// ```
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_override_wins() {
        let mut base = json!({"backup_configs": true});
        deep_merge(&mut base, json!({"backup_configs": false}));
        assert_eq!(base, json!({"backup_configs": false}));
    }

    #[test]
    fn nested_maps_merge_key_wise() {
        let mut base = json!({"sysctl": {"config_path": "/etc/sysctl.d/a.conf", "parameters": {}}});
        deep_merge(
            &mut base,
            json!({"sysctl": {"parameters": {"vm.swappiness": "10"}}}),
        );
        assert_eq!(
            base,
            json!({"sysctl": {"config_path": "/etc/sysctl.d/a.conf", "parameters": {"vm.swappiness": "10"}}})
        );
    }

    #[test]
    fn sequences_are_replaced_not_appended() {
        let mut base = json!({"audit_rules": ["-w /etc/passwd -p wa", "-w /etc/group -p wa"]});
        deep_merge(&mut base, json!({"audit_rules": ["-w /etc/hosts -p wa"]}));
        assert_eq!(base, json!({"audit_rules": ["-w /etc/hosts -p wa"]}));
    }

    #[test]
    fn object_replaces_scalar_and_vice_versa() {
        let mut base = json!({"a": 1, "b": {"c": 2}});
        deep_merge(&mut base, json!({"a": {"x": 1}, "b": "flat"}));
        assert_eq!(base, json!({"a": {"x": 1}, "b": "flat"}));
    }

    #[test]
    fn unknown_keys_are_added() {
        let mut base = json!({"dry_run": false});
        deep_merge(&mut base, json!({"timezone": "UTC"}));
        assert_eq!(base["timezone"], json!("UTC"));
        assert_eq!(base["dry_run"], json!(false));
    }

    #[test]
    fn existing_keys_keep_position_and_new_keys_append() {
        let mut base = json!({"directives": {"PermitRootLogin": "no", "MaxAuthTries": "3"}});
        deep_merge(
            &mut base,
            json!({"directives": {"MaxAuthTries": "4", "AllowTcpForwarding": "no"}}),
        );
        let keys: Vec<&String> = base["directives"]
            .as_object()
            .map(|m| m.keys().collect())
            .unwrap_or_default();
        assert_eq!(
            keys,
            ["PermitRootLogin", "MaxAuthTries", "AllowTcpForwarding"]
        );
        assert_eq!(base["directives"]["MaxAuthTries"], json!("4"));
    }
}
