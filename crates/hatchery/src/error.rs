//! Error types for the hatchery engine.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by environment provisioning and readiness checks.
///
/// Transport errors from the cluster API are propagated verbatim and
/// never retried outside the bounded poll loops. Everything else maps
/// one-to-one onto a readiness or configuration failure mode.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Cluster API call failed (network, auth, not-found)
    #[error("cluster API error: {0}")]
    Cluster(#[from] kube::Error),

    /// A readiness phase ran out its shared deadline
    #[error("timed out after {timeout:?} waiting for {waiting_for} (selector {selector:?} in namespace {namespace:?})")]
    Timeout {
        waiting_for: &'static str,
        selector: String,
        namespace: String,
        timeout: Duration,
    },

    /// A pod reached a terminal phase while Running was required.
    ///
    /// `Succeeded` lands here too: it signals a Job-shaped workload
    /// that will never be Running, which this engine does not support.
    #[error("pod {pod} reached terminal phase {phase} while waiting for Running")]
    TerminalPhase { pod: String, phase: String },

    /// A selector matched zero pods; waiting can never resolve this
    #[error("no pods in namespace {namespace:?} match selector {selector:?}")]
    NoMatchingPods { namespace: String, selector: String },

    /// Invalid environment or readiness configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// The external deployer reported a failure for one component
    #[error("deploy failed for component {component:?}: {message}")]
    Deploy { component: String, message: String },

    /// Malformed destination for a pod file copy
    #[error("destination {0:?} improperly formatted, expected NAMESPACE/POD_NAME:folder/FILE_NAME")]
    BadCopyDestination(String),

    /// The environment run was cancelled via its cancellation token
    #[error("environment run cancelled")]
    Cancelled,

    /// Filesystem or subprocess I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using [`EnvError`]
pub type Result<T> = std::result::Result<T, EnvError>;
