//! Ephemeral Kubernetes test environments.
//!
//! Hatchery provisions short-lived, multi-component environments on a
//! shared cluster and certifies that every deployed component is
//! actually usable before tests run against it. Deployment itself is
//! delegated to an external deployer (the reference implementation
//! shells out to `kubectl`); this crate composes components into one
//! named, labeled namespace, drives a bounded three-phase readiness
//! check per component (pods Running, containers ready, required log
//! line observed), and can later locate, inspect, and tear down the
//! environment purely by its labels.
//!
//! # Example
//!
//! ```rust,ignore
//! use hatchery::{
//!     ClusterClient, Component, Environment, EnvironmentConfig, KubectlDeployer, ReadyCheckData,
//! };
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! let cluster = ClusterClient::connect().await?;
//! let cancel = CancellationToken::new();
//!
//! let env = Environment::new(EnvironmentConfig::new("evm-5nodes"))
//!     .with_component(
//!         Component::new("geth", geth_manifest).with_ready_check(ReadyCheckData {
//!             running_selector: "app=geth".into(),
//!             log_selector: "app=geth".into(),
//!             container: "geth".into(),
//!             log_substring: "HTTP server started".into(),
//!             timeout: Duration::from_secs(180),
//!         }),
//!     )
//!     .run(&cluster, &KubectlDeployer::default(), cancel)
//!     .await?;
//!
//! println!("{:?}", env.connections());
//! env.teardown(&cluster).await?;
//! ```
//!
//! Components are applied strictly in add order, so a shared datastore
//! added first is ready before its dependents apply. One cancellation
//! token flows through the whole run; bridge process signals to it at
//! your entry point (see `examples/simple.rs`).

pub mod artifacts;
pub mod cluster;
pub mod config;
pub mod environment;
pub mod error;
pub mod labels;
pub mod manifest;
pub mod readiness;

pub use artifacts::Artifacts;
pub use cluster::{ClusterClient, ClusterOps};
pub use config::EnvironmentConfig;
pub use environment::{discover, ActiveEnvironment, Component, DiscoveredEnvironment, Environment};
pub use error::{EnvError, Result};
pub use manifest::{
    ApplyMode, ChartOutput, Deployer, KubectlDeployer, ManifestOutput, ReadyCheckData,
};
pub use readiness::{ReadinessProbe, POLL_INTERVAL};
