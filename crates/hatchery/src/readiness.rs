//! Readiness state machine.
//!
//! Three sequential phases judge whether a deployed component is
//! usable: every selected pod reaches Running, every reported container
//! status passes its readiness probe, and every log-selected pod emits
//! a required substring. Each phase is a bounded poll loop racing one
//! deadline computed once per probe; the deadline is never reset
//! between phases. Any phase failure aborts the remaining phases.

use std::collections::HashSet;
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cluster::{pod_names, ClusterOps};
use crate::error::{EnvError, Result};
use crate::manifest::{ManifestOutput, ReadyCheckData};

/// Fixed interval between poll ticks.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

fn pod_phase(pod: &Pod) -> &str {
    pod.status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        .unwrap_or("Unknown")
}

/// Bounded readiness check for one applied component.
///
/// Constructed from the component's [`ManifestOutput`]; the shared
/// deadline starts ticking at construction.
pub struct ReadinessProbe<'a> {
    cluster: &'a dyn ClusterOps,
    namespace: String,
    check: ReadyCheckData,
    cancel: CancellationToken,
    poll_interval: Duration,
    deadline: Instant,
}

impl std::fmt::Debug for ReadinessProbe<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessProbe")
            .field("namespace", &self.namespace)
            .field("check", &self.check)
            .field("poll_interval", &self.poll_interval)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl<'a> ReadinessProbe<'a> {
    /// Validate the component's readiness contract and start the clock.
    pub fn new(
        cluster: &'a dyn ClusterOps,
        output: &dyn ManifestOutput,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let check = output.ready_check();
        check.validate()?;
        Ok(Self {
            cluster,
            namespace: output.namespace().to_string(),
            deadline: Instant::now() + check.timeout,
            check,
            cancel,
            poll_interval: POLL_INTERVAL,
        })
    }

    /// Override the poll interval. The deadline is unaffected.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Phases 1 and 2: pods Running, then containers ready.
    pub async fn wait_ready(&self) -> Result<()> {
        self.pods_running().await?;
        self.containers_ready().await
    }

    /// All three phases in order, against the same deadline.
    pub async fn wait_fully_ready(&self) -> Result<()> {
        self.wait_ready().await?;
        self.log_substring().await
    }

    /// Phase 1: every pod matching the running selector reaches the
    /// Running phase.
    ///
    /// An empty match fails immediately: nothing to check is distinct
    /// from not yet ready, and waiting cannot resolve it. A Failed pod
    /// is terminal. So is Succeeded: it means a run-to-completion
    /// workload that will never be Running.
    pub async fn pods_running(&self) -> Result<()> {
        let selector = &self.check.running_selector;
        let pods = self.cluster.list_pods(&self.namespace, selector).await?;
        if pods.is_empty() {
            return Err(self.no_pods(selector));
        }
        info!(pods = ?pod_names(&pods), "waiting for pods in state Running");

        let names: Vec<String> = pods
            .iter()
            .filter_map(|pod| pod.metadata.name.clone())
            .collect();
        for name in &names {
            loop {
                let pod = self.cluster.get_pod(&self.namespace, name).await?;
                match pod_phase(&pod) {
                    "Running" => break,
                    phase @ ("Failed" | "Succeeded") => {
                        if phase == "Succeeded" {
                            warn!(pod = %name, "pod succeeded, is this a Job-shaped workload?");
                        }
                        return Err(EnvError::TerminalPhase {
                            pod: name.clone(),
                            phase: phase.to_string(),
                        });
                    }
                    phase => {
                        debug!(pod = %name, phase = %phase, "pod not running yet");
                        self.tick("pods in state Running", selector).await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Phase 2: every reported container status across every matching
    /// pod passes its readiness probe.
    pub async fn containers_ready(&self) -> Result<()> {
        let selector = &self.check.running_selector;
        loop {
            let pods = self.cluster.list_pods(&self.namespace, selector).await?;
            if pods.is_empty() {
                return Err(self.no_pods(selector));
            }
            info!(pods = ?pod_names(&pods), "waiting for pod readiness probes");

            let mut all_ready = true;
            for pod in &pods {
                let statuses = pod
                    .status
                    .as_ref()
                    .and_then(|status| status.container_statuses.as_deref())
                    .unwrap_or(&[]);
                for status in statuses {
                    if !status.ready {
                        debug!(
                            pod = ?pod.metadata.name,
                            container = %status.name,
                            "container not ready"
                        );
                        all_ready = false;
                    }
                }
            }
            if all_ready {
                return Ok(());
            }
            self.tick("container readiness probes", selector).await?;
        }
    }

    /// Phase 3: every pod matching the log selector logs the required
    /// substring at least once.
    ///
    /// Each tick opens a fresh bounded tail per unmatched pod rather
    /// than holding a follow stream: a crashing or restarting container
    /// invalidates a held stream, so re-opening is the correct strategy.
    pub async fn log_substring(&self) -> Result<()> {
        let selector = &self.check.log_selector;
        let pods = self.cluster.list_pods(&self.namespace, selector).await?;
        if pods.is_empty() {
            return Err(self.no_pods(selector));
        }
        info!(
            pods = ?pod_names(&pods),
            substring = %self.check.log_substring,
            "searching for log substring"
        );

        let names: Vec<String> = pods
            .iter()
            .filter_map(|pod| pod.metadata.name.clone())
            .collect();
        let mut matched: HashSet<&str> = HashSet::new();
        loop {
            for name in &names {
                if matched.contains(name.as_str()) {
                    continue;
                }
                let log = self
                    .cluster
                    .pod_log_tail(&self.namespace, name, &self.check.container)
                    .await?;
                if log
                    .lines()
                    .any(|line| line.contains(&self.check.log_substring))
                {
                    debug!(pod = %name, "log substring found");
                    matched.insert(name);
                }
            }
            if matched.len() == names.len() {
                info!("all log substrings have been found");
                return Ok(());
            }
            self.tick("log substring", selector).await?;
        }
    }

    /// Sleep one poll interval, racing cancellation and the shared
    /// deadline. The deadline arm is checked first so a tick landing
    /// exactly on the boundary reports a timeout, not another poll.
    async fn tick(&self, waiting_for: &'static str, selector: &str) -> Result<()> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(EnvError::Cancelled),
            () = time::sleep_until(self.deadline) => Err(EnvError::Timeout {
                waiting_for,
                selector: selector.to_string(),
                namespace: self.namespace.clone(),
                timeout: self.check.timeout,
            }),
            () = time::sleep(self.poll_interval) => Ok(()),
        }
    }

    fn no_pods(&self, selector: &str) -> EnvError {
        EnvError::NoMatchingPods {
            namespace: self.namespace.clone(),
            selector: selector.to_string(),
        }
    }
}
