//! Cluster API access and namespace lifecycle.
//!
//! All cluster operations the engine needs go through the [`ClusterOps`]
//! trait so tests can substitute a scripted fake. [`ClusterClient`] is
//! the production implementation over a pre-authenticated kube client.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, ListParams, LogParams, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::{debug, info};

use crate::error::Result;
use crate::labels::INSTANCE_LABEL_KEY;

/// Number of log lines fetched per bounded tail.
pub const LOG_TAIL_LINES: i64 = 1000;

/// Cluster operations consumed by readiness checks and the
/// composition engine.
///
/// Calls are synchronous request/response against the cluster API;
/// retrying is the caller's concern (the readiness poll loops).
#[async_trait]
pub trait ClusterOps: Send + Sync {
    /// List pods in a namespace matching a label selector.
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>>;

    /// Get a single pod by name.
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod>;

    /// Fetch a bounded tail of a container's log, without following.
    ///
    /// A fresh request per call is deliberate: a held stream does not
    /// survive container restarts.
    async fn pod_log_tail(&self, namespace: &str, pod: &str, container: &str) -> Result<String>;

    /// Add or overwrite one label on a pod.
    async fn patch_pod_label(
        &self,
        namespace: &str,
        pod: &str,
        key: &str,
        value: &str,
    ) -> Result<()>;

    /// List namespaces matching a label selector.
    async fn list_namespaces(&self, selector: &str) -> Result<Vec<Namespace>>;

    /// Existence probe for a namespace.
    ///
    /// Any retrieval error is treated as "does not exist"; transient
    /// transport errors are not distinguished from absence.
    async fn namespace_exists(&self, namespace: &str) -> bool;

    /// Create a namespace with the given labels.
    ///
    /// Not idempotent; callers pre-check with [`Self::namespace_exists`].
    /// Failures surface verbatim.
    async fn create_namespace(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// Issue a namespace delete and return immediately.
    ///
    /// Deletion is asynchronous on the cluster side; callers that need
    /// determinism must poll [`Self::namespace_exists`] themselves.
    async fn remove_namespace(&self, namespace: &str) -> Result<()>;
}

/// Kubernetes-backed [`ClusterOps`] implementation.
#[derive(Clone)]
pub struct ClusterClient {
    client: Client,
}

impl ClusterClient {
    /// Wrap an already-connected kube client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the local kubeconfig / in-cluster environment.
    pub async fn connect() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self { client })
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn namespaces(&self) -> Api<Namespace> {
        Api::all(self.client.clone())
    }
}

#[async_trait]
impl ClusterOps for ClusterClient {
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>> {
        let params = ListParams::default().labels(selector);
        let list = self.pods(namespace).list(&params).await?;
        Ok(list.items)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        Ok(self.pods(namespace).get(name).await?)
    }

    async fn pod_log_tail(&self, namespace: &str, pod: &str, container: &str) -> Result<String> {
        let params = LogParams {
            container: Some(container.to_string()),
            follow: false,
            tail_lines: Some(LOG_TAIL_LINES),
            ..LogParams::default()
        };
        Ok(self.pods(namespace).logs(pod, &params).await?)
    }

    async fn patch_pod_label(
        &self,
        namespace: &str,
        pod: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let patch = serde_json::json!({
            "metadata": { "labels": { key: value } }
        });
        self.pods(namespace)
            .patch(pod, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn list_namespaces(&self, selector: &str) -> Result<Vec<Namespace>> {
        let params = ListParams::default().labels(selector);
        let list = self.namespaces().list(&params).await?;
        Ok(list.items)
    }

    async fn namespace_exists(&self, namespace: &str) -> bool {
        self.namespaces().get(namespace).await.is_ok()
    }

    async fn create_namespace(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(namespace.to_string()),
                labels: Some(labels.clone()),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        };
        info!(namespace = %namespace, "creating namespace");
        self.namespaces().create(&PostParams::default(), &ns).await?;
        Ok(())
    }

    async fn remove_namespace(&self, namespace: &str) -> Result<()> {
        info!(namespace = %namespace, "removing namespace");
        self.namespaces()
            .delete(namespace, &DeleteParams::default())
            .await?;
        Ok(())
    }
}

/// Assign a sequential `instance` label to every pod matching the
/// selector, in list order. Disambiguates pods with identical specs.
pub async fn enumerate_instances(
    cluster: &dyn ClusterOps,
    namespace: &str,
    selector: &str,
) -> Result<()> {
    let pods = cluster.list_pods(namespace, selector).await?;
    for (id, pod) in pods.iter().enumerate() {
        let Some(name) = pod.metadata.name.as_deref() else {
            continue;
        };
        debug!(pod = %name, instance = id, "labeling pod instance");
        cluster
            .patch_pod_label(namespace, name, INSTANCE_LABEL_KEY, &id.to_string())
            .await?;
    }
    Ok(())
}

/// Collect the distinct `app` label values among pods matching a
/// selector. Used by discovery tooling to show what runs where.
pub async fn unique_app_labels(
    cluster: &dyn ClusterOps,
    namespace: &str,
    selector: &str,
) -> Result<Vec<String>> {
    let pods = cluster.list_pods(namespace, selector).await?;
    let mut apps = Vec::new();
    for pod in &pods {
        let Some(app) = pod
            .metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get("app"))
        else {
            continue;
        };
        if !apps.iter().any(|seen| seen == app) {
            apps.push(app.clone());
        }
    }
    info!(apps = ?apps, "apps found");
    Ok(apps)
}

/// Names of the pods in a listing, for log context.
pub(crate) fn pod_names(pods: &[Pod]) -> Vec<&str> {
    pods.iter()
        .filter_map(|pod| pod.metadata.name.as_deref())
        .collect()
}
