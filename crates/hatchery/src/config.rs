//! Environment configuration types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration for one environment, fixed at builder construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Namespace identifier. Generated from `env_type` plus a random
    /// suffix when not supplied. Immutable once `run` begins applying.
    pub namespace: Option<String>,
    /// Environment kind, recorded in the env-type label for discovery
    pub env_type: String,
    /// Extra labels applied to the namespace alongside the control marker
    pub labels: BTreeMap<String, String>,
    /// Keep the namespace alive when the environment handle is torn down
    pub keep_alive: bool,
    /// Delete the namespace when the run is interrupted
    pub remove_on_interrupt: bool,
}

impl EnvironmentConfig {
    /// Minimal configuration for an environment of the given type.
    pub fn new(env_type: impl Into<String>) -> Self {
        Self {
            namespace: None,
            env_type: env_type.into(),
            labels: BTreeMap::new(),
            keep_alive: false,
            remove_on_interrupt: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_config_has_no_flags_set() {
        let config = EnvironmentConfig::new("smoke");
        assert_eq!(config.env_type, "smoke");
        assert!(config.namespace.is_none());
        assert!(!config.keep_alive);
        assert!(!config.remove_on_interrupt);
        assert!(config.labels.is_empty());
    }
}
