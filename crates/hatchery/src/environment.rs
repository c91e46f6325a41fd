//! Environment composition engine.
//!
//! An [`Environment`] is a staged builder: components accumulate in add
//! order, and `run` consumes the builder once, materializing the
//! namespace, applying components strictly sequentially through the
//! external deployer, readiness-checking each before the next begins,
//! and aggregating every component's connections. Cancellation is an
//! injected token; the signal-to-token bridge belongs at the process
//! entry point, not in this engine.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cluster::{enumerate_instances, ClusterOps};
use crate::config::EnvironmentConfig;
use crate::error::{EnvError, Result};
use crate::labels::{base_labels, control_selector, env_type_selector, ENV_TYPE_LABEL_KEY};
use crate::manifest::{Deployer, ManifestOutput, ReadyCheckData};
use crate::readiness::ReadinessProbe;

/// One deployable unit: a rendered chart/release plus its declared
/// readiness criteria and exposed endpoints.
///
/// Owned exclusively by its environment; position in the component
/// sequence is apply order. Never mutated after apply.
#[derive(Debug, Clone)]
pub struct Component {
    /// Component identity, keying its entry in the connection map
    pub name: String,
    /// Override tree merged over chart defaults by the renderer
    pub values: Value,
    /// Fully rendered manifest handed to the deployer
    pub manifest: String,
    /// Readiness criteria the manifest output will report
    pub ready_check: ReadyCheckData,
    /// Exposed endpoints; `{namespace}` is resolved at connection time
    pub endpoints: Vec<String>,
}

impl Component {
    pub fn new(name: impl Into<String>, manifest: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Value::Null,
            manifest: manifest.into(),
            ready_check: ReadyCheckData::default(),
            endpoints: Vec::new(),
        }
    }

    pub fn with_values(mut self, values: Value) -> Self {
        self.values = values;
        self
    }

    pub fn with_ready_check(mut self, ready_check: ReadyCheckData) -> Self {
        self.ready_check = ready_check;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoints.push(endpoint.into());
        self
    }
}

/// Staged environment builder.
///
/// Each chained call consumes and returns the builder, so a component
/// list can never be aliased across environments. `run` consumes the
/// builder once and yields an [`ActiveEnvironment`].
pub struct Environment {
    config: EnvironmentConfig,
    components: Vec<Component>,
}

impl Environment {
    pub fn new(config: EnvironmentConfig) -> Self {
        Self {
            config,
            components: Vec::new(),
        }
    }

    /// Append a component. First added, first applied; later components
    /// may depend on earlier ones being ready.
    #[must_use]
    pub fn with_component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Bring the environment up and certify it.
    ///
    /// Materializes the namespace if absent (with the control marker
    /// and env-type label so the environment is discoverable), applies
    /// each component in add order, runs its readiness check, labels
    /// pod instances, and aggregates connections.
    ///
    /// The first apply or readiness failure aborts the run and is
    /// returned; nothing is retried. On cancellation the namespace is
    /// deleted exactly once iff `remove_on_interrupt` is set, and
    /// [`EnvError::Cancelled`] is returned; the caller decides what to
    /// do with any other partially-applied namespace.
    pub async fn run(
        self,
        cluster: &dyn ClusterOps,
        deployer: &dyn Deployer,
        cancel: CancellationToken,
    ) -> Result<ActiveEnvironment> {
        let Environment { config, components } = self;
        // The namespace identifier is fixed here, before any apply.
        let namespace = match config.namespace.clone() {
            Some(namespace) => namespace,
            None => generate_namespace(&config.env_type),
        };

        match apply_all(cluster, deployer, &cancel, &config, &namespace, &components).await {
            Ok((outputs, connections)) => {
                info!(namespace = %namespace, "environment is up");
                Ok(ActiveEnvironment {
                    namespace,
                    config,
                    outputs,
                    connections,
                })
            }
            Err(err) => {
                if matches!(err, EnvError::Cancelled) && config.remove_on_interrupt {
                    info!(namespace = %namespace, "run interrupted, removing namespace");
                    if let Err(remove_err) = cluster.remove_namespace(&namespace).await {
                        warn!(error = %remove_err, "namespace removal after interrupt failed");
                    }
                }
                Err(err)
            }
        }
    }
}

async fn apply_all(
    cluster: &dyn ClusterOps,
    deployer: &dyn Deployer,
    cancel: &CancellationToken,
    config: &EnvironmentConfig,
    namespace: &str,
    components: &[Component],
) -> Result<(Vec<Box<dyn ManifestOutput>>, HashMap<String, Vec<String>>)> {
    if cluster.namespace_exists(namespace).await {
        info!(namespace = %namespace, "namespace exists, reusing");
    } else {
        let labels = base_labels(&config.env_type, &config.labels);
        cluster.create_namespace(namespace, &labels).await?;
    }

    let mut outputs: Vec<Box<dyn ManifestOutput>> = Vec::new();
    let mut connections: HashMap<String, Vec<String>> = HashMap::new();
    for component in components {
        if cancel.is_cancelled() {
            return Err(EnvError::Cancelled);
        }
        info!(component = %component.name, namespace = %namespace, "applying component");
        let output = deployer.apply(namespace, component).await?;

        let probe = ReadinessProbe::new(cluster, output.as_ref(), cancel.clone())?;
        probe.wait_ready().await?;
        enumerate_instances(
            cluster,
            output.namespace(),
            &output.ready_check().running_selector,
        )
        .await?;

        for (name, endpoints) in output.connections()? {
            connections.entry(name).or_default().extend(endpoints);
        }
        outputs.push(output);
    }
    Ok((outputs, connections))
}

fn generate_namespace(env_type: &str) -> String {
    let mut suffix = Uuid::new_v4().simple().to_string();
    suffix.truncate(8);
    format!("{env_type}-{suffix}")
}

/// Live handle to a fully-applied environment.
pub struct ActiveEnvironment {
    namespace: String,
    config: EnvironmentConfig,
    outputs: Vec<Box<dyn ManifestOutput>>,
    connections: HashMap<String, Vec<String>>,
}

impl std::fmt::Debug for ActiveEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveEnvironment")
            .field("namespace", &self.namespace)
            .field("config", &self.config)
            .field("connections", &self.connections)
            .finish_non_exhaustive()
    }
}

impl ActiveEnvironment {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Aggregated connections: component identity to endpoint list.
    pub fn connections(&self) -> &HashMap<String, Vec<String>> {
        &self.connections
    }

    pub fn outputs(&self) -> &[Box<dyn ManifestOutput>] {
        &self.outputs
    }

    /// Delete the backing namespace unless keep-alive is set.
    ///
    /// The delete returns as soon as the cluster accepts it; callers
    /// needing full termination poll namespace existence themselves.
    pub async fn teardown(&self, cluster: &dyn ClusterOps) -> Result<()> {
        if self.config.keep_alive {
            info!(namespace = %self.namespace, "keep-alive set, leaving namespace in place");
            return Ok(());
        }
        cluster.remove_namespace(&self.namespace).await
    }
}

/// An engine-managed namespace found by label discovery.
#[derive(Debug, Clone)]
pub struct DiscoveredEnvironment {
    pub namespace: String,
    pub env_type: Option<String>,
    pub labels: BTreeMap<String, String>,
}

/// Enumerate live environments by their identity labels alone.
///
/// Any process with cluster read access can do this; there is no
/// separate registry to consult.
pub async fn discover(
    cluster: &dyn ClusterOps,
    env_type: Option<&str>,
) -> Result<Vec<DiscoveredEnvironment>> {
    let selector = match env_type {
        Some(env_type) => env_type_selector(env_type),
        None => control_selector(),
    };
    let namespaces = cluster.list_namespaces(&selector).await?;
    let environments = namespaces
        .into_iter()
        .filter_map(|namespace| {
            let name = namespace.metadata.name?;
            let labels = namespace.metadata.labels.unwrap_or_default();
            let env_type = labels.get(ENV_TYPE_LABEL_KEY).cloned();
            Some(DiscoveredEnvironment {
                namespace: name,
                env_type,
                labels,
            })
        })
        .collect();
    Ok(environments)
}
