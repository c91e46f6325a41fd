//! Label scheme for environment discovery.
//!
//! Every namespace this engine creates carries a control marker and an
//! environment-type label. Discovery is a pure label-selector query on
//! those two pairs; there is no separate registry.

use std::collections::BTreeMap;

/// Marks a namespace as managed by this engine.
pub const CONTROL_LABEL_KEY: &str = "hatchery.io/managed";
pub const CONTROL_LABEL_VALUE: &str = "true";

/// Identifies the kind of environment (e.g. "evm-5nodes").
pub const ENV_TYPE_LABEL_KEY: &str = "hatchery.io/env-type";

/// Sequential per-pod label disambiguating identical pod specs.
pub const INSTANCE_LABEL_KEY: &str = "instance";

/// Selector matching every engine-managed namespace.
pub fn control_selector() -> String {
    format!("{CONTROL_LABEL_KEY}={CONTROL_LABEL_VALUE}")
}

/// Selector matching engine-managed namespaces of one environment type.
pub fn env_type_selector(env_type: &str) -> String {
    format!("{},{ENV_TYPE_LABEL_KEY}={env_type}", control_selector())
}

/// Full label set for an environment namespace.
///
/// User labels are merged under the engine's identity labels; on key
/// conflict the engine wins, otherwise discovery would break.
pub fn base_labels(
    env_type: &str,
    user_labels: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut labels = user_labels.clone();
    labels.insert(CONTROL_LABEL_KEY.to_string(), CONTROL_LABEL_VALUE.to_string());
    labels.insert(ENV_TYPE_LABEL_KEY.to_string(), env_type.to_string());
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_selector_matches_marker_pair() {
        assert_eq!(control_selector(), "hatchery.io/managed=true");
    }

    #[test]
    fn env_type_selector_includes_both_labels() {
        let sel = env_type_selector("evm-5nodes");
        assert!(sel.contains("hatchery.io/managed=true"));
        assert!(sel.contains("hatchery.io/env-type=evm-5nodes"));
    }

    #[test]
    fn base_labels_merges_user_labels() {
        let user = BTreeMap::from([("team".to_string(), "core".to_string())]);
        let labels = base_labels("smoke", &user);
        assert_eq!(labels.get("team").map(String::as_str), Some("core"));
        assert_eq!(
            labels.get(ENV_TYPE_LABEL_KEY).map(String::as_str),
            Some("smoke")
        );
        assert_eq!(
            labels.get(CONTROL_LABEL_KEY).map(String::as_str),
            Some(CONTROL_LABEL_VALUE)
        );
    }

    #[test]
    fn engine_labels_win_on_conflict() {
        let user = BTreeMap::from([(CONTROL_LABEL_KEY.to_string(), "false".to_string())]);
        let labels = base_labels("smoke", &user);
        assert_eq!(
            labels.get(CONTROL_LABEL_KEY).map(String::as_str),
            Some(CONTROL_LABEL_VALUE)
        );
    }
}
