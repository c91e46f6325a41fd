//! Scripted in-memory cluster.
//!
//! Pods advance through observation schedules: `get_pod` consumes one
//! phase observation, `list_pods` consumes one container-readiness
//! observation, `pod_log_tail` consumes one log observation. The last
//! entry of each schedule repeats forever. Every call is recorded in
//! an operation log so tests can assert ordering and call counts.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    Container, ContainerStatus, Namespace, Pod, PodSpec, PodStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use hatchery::cluster::ClusterOps;
use hatchery::error::{EnvError, Result};

/// One recorded cluster API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    ListPods { namespace: String, selector: String },
    GetPod { namespace: String, pod: String },
    LogTail { namespace: String, pod: String, container: String },
    PatchLabel { pod: String, key: String, value: String },
    ListNamespaces { selector: String },
    NamespaceExists { namespace: String },
    CreateNamespace { namespace: String },
    RemoveNamespace { namespace: String },
}

/// Script for one pod.
#[derive(Debug, Clone)]
pub struct FakePod {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub container: String,
    /// Phase per `get_pod` observation; last entry repeats
    pub phases: Vec<&'static str>,
    /// Container readiness per `list_pods` observation; last repeats
    pub ready: Vec<bool>,
    /// Log tail content per `pod_log_tail` fetch; last repeats
    pub logs: Vec<String>,
}

impl FakePod {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            container: "app".to_string(),
            phases: vec!["Running"],
            ready: vec![true],
            logs: vec![String::new()],
        }
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_container(mut self, container: &str) -> Self {
        self.container = container.to_string();
        self
    }

    pub fn with_phases(mut self, phases: Vec<&'static str>) -> Self {
        self.phases = phases;
        self
    }

    pub fn with_ready(mut self, ready: Vec<bool>) -> Self {
        self.ready = ready;
        self
    }

    pub fn with_logs(mut self, logs: Vec<&str>) -> Self {
        self.logs = logs.into_iter().map(str::to_string).collect();
        self
    }
}

#[derive(Debug)]
struct PodState {
    spec: FakePod,
    phase_obs: usize,
    ready_obs: usize,
    log_obs: usize,
}

fn sample<T: Clone>(schedule: &[T], observation: usize, fallback: T) -> T {
    schedule
        .get(observation.min(schedule.len().saturating_sub(1)))
        .cloned()
        .unwrap_or(fallback)
}

fn selector_matches(selector: &str, labels: &BTreeMap<String, String>) -> bool {
    if selector.is_empty() {
        return true;
    }
    selector.split(',').all(|pair| match pair.split_once('=') {
        Some((key, value)) => labels.get(key).map(String::as_str) == Some(value),
        None => false,
    })
}

#[derive(Debug, Default)]
struct Inner {
    /// namespace -> scripted pods, in insertion order
    pods: HashMap<String, Vec<PodState>>,
    /// existing namespaces and their labels
    namespaces: HashMap<String, BTreeMap<String, String>>,
    ops: Vec<Op>,
    removed: Vec<String>,
}

/// In-memory [`ClusterOps`] implementation driven by pod scripts.
#[derive(Debug, Default)]
pub struct FakeCluster {
    inner: Mutex<Inner>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a pod into a namespace. The namespace itself need not exist;
    /// pods are visible to listings either way.
    pub fn add_pod(&self, namespace: &str, pod: FakePod) {
        let mut inner = self.lock();
        inner
            .pods
            .entry(namespace.to_string())
            .or_default()
            .push(PodState {
                spec: pod,
                phase_obs: 0,
                ready_obs: 0,
                log_obs: 0,
            });
    }

    /// Seed an already-existing namespace.
    pub fn add_namespace(&self, namespace: &str, labels: BTreeMap<String, String>) {
        self.lock()
            .namespaces
            .insert(namespace.to_string(), labels);
    }

    /// Everything the engine asked of the cluster, in call order.
    pub fn ops(&self) -> Vec<Op> {
        self.lock().ops.clone()
    }

    /// How often `remove_namespace` was invoked for a namespace.
    pub fn remove_count(&self, namespace: &str) -> usize {
        self.lock()
            .removed
            .iter()
            .filter(|removed| removed.as_str() == namespace)
            .count()
    }

    pub fn namespace_labels(&self, namespace: &str) -> Option<BTreeMap<String, String>> {
        self.lock().namespaces.get(namespace).cloned()
    }

    pub fn pod_labels(&self, namespace: &str, pod: &str) -> Option<BTreeMap<String, String>> {
        self.lock()
            .pods
            .get(namespace)?
            .iter()
            .find(|state| state.spec.name == pod)
            .map(|state| state.spec.labels.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("fake cluster lock poisoned")
    }

    fn pod_object(state: &PodState, phase: &str, ready: bool) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(state.spec.name.clone()),
                labels: Some(state.spec.labels.clone()),
                ..ObjectMeta::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: state.spec.container.clone(),
                    ..Container::default()
                }],
                ..PodSpec::default()
            }),
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                container_statuses: Some(vec![ContainerStatus {
                    name: state.spec.container.clone(),
                    ready,
                    ..ContainerStatus::default()
                }]),
                ..PodStatus::default()
            }),
            ..Pod::default()
        }
    }
}

#[async_trait]
impl ClusterOps for FakeCluster {
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>> {
        let mut inner = self.lock();
        inner.ops.push(Op::ListPods {
            namespace: namespace.to_string(),
            selector: selector.to_string(),
        });
        let mut pods = Vec::new();
        if let Some(states) = inner.pods.get_mut(namespace) {
            for state in states
                .iter_mut()
                .filter(|state| selector_matches(selector, &state.spec.labels))
            {
                let phase = sample(&state.spec.phases, state.phase_obs, "Running");
                let ready = sample(&state.spec.ready, state.ready_obs, true);
                state.ready_obs += 1;
                pods.push(Self::pod_object(state, phase, ready));
            }
        }
        Ok(pods)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        let mut inner = self.lock();
        inner.ops.push(Op::GetPod {
            namespace: namespace.to_string(),
            pod: name.to_string(),
        });
        let state = inner
            .pods
            .get_mut(namespace)
            .and_then(|states| states.iter_mut().find(|state| state.spec.name == name))
            .ok_or_else(|| EnvError::Config(format!("fake cluster has no pod {namespace}/{name}")))?;
        let phase = sample(&state.spec.phases, state.phase_obs, "Running");
        let ready = sample(&state.spec.ready, state.ready_obs, true);
        state.phase_obs += 1;
        Ok(Self::pod_object(state, phase, ready))
    }

    async fn pod_log_tail(&self, namespace: &str, pod: &str, container: &str) -> Result<String> {
        let mut inner = self.lock();
        inner.ops.push(Op::LogTail {
            namespace: namespace.to_string(),
            pod: pod.to_string(),
            container: container.to_string(),
        });
        let state = inner
            .pods
            .get_mut(namespace)
            .and_then(|states| states.iter_mut().find(|state| state.spec.name == pod))
            .ok_or_else(|| EnvError::Config(format!("fake cluster has no pod {namespace}/{pod}")))?;
        let log = sample(&state.spec.logs, state.log_obs, String::new());
        state.log_obs += 1;
        Ok(log)
    }

    async fn patch_pod_label(
        &self,
        namespace: &str,
        pod: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let mut inner = self.lock();
        inner.ops.push(Op::PatchLabel {
            pod: pod.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        });
        let state = inner
            .pods
            .get_mut(namespace)
            .and_then(|states| states.iter_mut().find(|state| state.spec.name == pod))
            .ok_or_else(|| EnvError::Config(format!("fake cluster has no pod {namespace}/{pod}")))?;
        state
            .spec
            .labels
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn list_namespaces(&self, selector: &str) -> Result<Vec<Namespace>> {
        let mut inner = self.lock();
        inner.ops.push(Op::ListNamespaces {
            selector: selector.to_string(),
        });
        let mut namespaces: Vec<Namespace> = inner
            .namespaces
            .iter()
            .filter(|(_, labels)| selector_matches(selector, labels))
            .map(|(name, labels)| Namespace {
                metadata: ObjectMeta {
                    name: Some(name.clone()),
                    labels: Some(labels.clone()),
                    ..ObjectMeta::default()
                },
                ..Namespace::default()
            })
            .collect();
        namespaces.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Ok(namespaces)
    }

    async fn namespace_exists(&self, namespace: &str) -> bool {
        let mut inner = self.lock();
        inner.ops.push(Op::NamespaceExists {
            namespace: namespace.to_string(),
        });
        inner.namespaces.contains_key(namespace)
    }

    async fn create_namespace(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        let mut inner = self.lock();
        inner.ops.push(Op::CreateNamespace {
            namespace: namespace.to_string(),
        });
        inner
            .namespaces
            .insert(namespace.to_string(), labels.clone());
        Ok(())
    }

    async fn remove_namespace(&self, namespace: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.ops.push(Op::RemoveNamespace {
            namespace: namespace.to_string(),
        });
        inner.removed.push(namespace.to_string());
        inner.namespaces.remove(namespace);
        Ok(())
    }
}
