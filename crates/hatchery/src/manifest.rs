//! Manifest Output Contract and the external deployer boundary.
//!
//! A deployed component is represented at runtime by a [`ManifestOutput`]:
//! the capability set the readiness state machine and connection
//! aggregation need, and nothing more. Deployers produce one per applied
//! component; [`KubectlDeployer`] is the reference implementation that
//! shells out to `kubectl`.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info};

use crate::environment::Component;
use crate::error::{EnvError, Result};

/// Well-known filename the rendered manifest is written to before each
/// apply. Overwritten on every operation and not namespaced; concurrent
/// applies within one process are out of contract.
pub const TMP_MANIFEST: &str = "tmp-manifest.yaml";

/// Placeholder in declared endpoints resolved to the live namespace.
pub const NAMESPACE_PLACEHOLDER: &str = "{namespace}";

/// Declarative readiness contract for one component.
///
/// The default value is intentionally invalid (empty selectors, zero
/// timeout) and is rejected by [`ReadyCheckData::validate`]; every
/// component must declare its own criteria.
#[derive(Debug, Clone, Default)]
pub struct ReadyCheckData {
    /// Pods that must reach Running and pass container readiness
    pub running_selector: String,
    /// Pods whose logs are scanned for the substring (may differ)
    pub log_selector: String,
    /// Container whose log stream is scanned
    pub container: String,
    /// Substring every matched pod must log at least once
    pub log_substring: String,
    /// Single deadline shared by all readiness phases
    pub timeout: Duration,
}

impl ReadyCheckData {
    /// Reject configurations the state machine cannot act on.
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(EnvError::Config(
                "readiness timeout must be greater than zero".to_string(),
            ));
        }
        if self.running_selector.is_empty() {
            return Err(EnvError::Config(
                "readiness running selector must not be empty".to_string(),
            ));
        }
        if self.log_selector.is_empty() {
            return Err(EnvError::Config(
                "readiness log selector must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Runtime handle to an applied component.
///
/// Owned by its component, read by the readiness state machine and by
/// connection aggregation. Exactly four capabilities; concrete component
/// kinds implement this without inheritance chains.
pub trait ManifestOutput: Send + Sync {
    /// Namespace the component landed in
    fn namespace(&self) -> &str;

    /// Rebind the output to a different namespace
    fn set_namespace(&mut self, namespace: String);

    /// Readiness criteria that apply to this component
    fn ready_check(&self) -> ReadyCheckData;

    /// Resolve exposed connections: component name to reachable endpoints
    fn connections(&self) -> Result<HashMap<String, Vec<String>>>;
}

/// Plain [`ManifestOutput`] carrier for chart-shaped components.
///
/// Endpoints may contain the `{namespace}` placeholder, resolved
/// against the live namespace when connections are read.
#[derive(Debug, Clone)]
pub struct ChartOutput {
    namespace: String,
    component: String,
    ready_check: ReadyCheckData,
    endpoints: Vec<String>,
}

impl ChartOutput {
    pub fn new(namespace: impl Into<String>, component: &Component) -> Self {
        Self {
            namespace: namespace.into(),
            component: component.name.clone(),
            ready_check: component.ready_check.clone(),
            endpoints: component.endpoints.clone(),
        }
    }
}

impl ManifestOutput for ChartOutput {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn set_namespace(&mut self, namespace: String) {
        self.namespace = namespace;
    }

    fn ready_check(&self) -> ReadyCheckData {
        self.ready_check.clone()
    }

    fn connections(&self) -> Result<HashMap<String, Vec<String>>> {
        let endpoints = self
            .endpoints
            .iter()
            .map(|endpoint| endpoint.replace(NAMESPACE_PLACEHOLDER, &self.namespace))
            .collect();
        Ok(HashMap::from([(self.component.clone(), endpoints)]))
    }
}

/// External chart-application mechanism.
///
/// Success yields a live [`ManifestOutput`] bound to the namespace the
/// component was applied into.
#[async_trait]
pub trait Deployer: Send + Sync {
    async fn apply(&self, namespace: &str, component: &Component)
        -> Result<Box<dyn ManifestOutput>>;
}

/// How [`KubectlDeployer`] submits the manifest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApplyMode {
    #[default]
    Apply,
    Create,
    /// Write the manifest file only, submit nothing
    DryRun,
}

/// Reference deployer: writes the rendered manifest to [`TMP_MANIFEST`]
/// and invokes `kubectl`.
#[derive(Debug, Clone, Default)]
pub struct KubectlDeployer {
    mode: ApplyMode,
}

impl KubectlDeployer {
    pub fn new(mode: ApplyMode) -> Self {
        Self { mode }
    }

    async fn kubectl(&self, args: &[&str], component: &str) -> Result<()> {
        debug!(?args, "invoking kubectl");
        let output = Command::new("kubectl")
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;
        if !output.status.success() {
            return Err(EnvError::Deploy {
                component: component.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Deployer for KubectlDeployer {
    async fn apply(
        &self,
        namespace: &str,
        component: &Component,
    ) -> Result<Box<dyn ManifestOutput>> {
        tokio::fs::write(TMP_MANIFEST, &component.manifest).await?;
        match self.mode {
            ApplyMode::Apply => {
                info!(component = %component.name, "applying manifest");
                self.kubectl(&["apply", "-f", TMP_MANIFEST], &component.name)
                    .await?;
            }
            ApplyMode::Create => {
                info!(component = %component.name, "creating manifest");
                self.kubectl(&["create", "-f", TMP_MANIFEST], &component.name)
                    .await?;
            }
            ApplyMode::DryRun => {
                info!(component = %component.name, "dry run, manifest written only");
            }
        }
        Ok(Box::new(ChartOutput::new(namespace, component)))
    }
}

/// Deep-merge two override trees; `overrides` wins on conflicts,
/// objects merge key-wise, everything else is replaced wholesale.
pub fn merge_values(base: &Value, overrides: &Value) -> Value {
    match (base, overrides) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => merge_values(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        (_, other) => other.clone(),
    }
}
