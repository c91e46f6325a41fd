//! Test harnesses for the hatchery engine.
//!
//! Provides a scripted [`FakeCluster`] implementing `ClusterOps` with
//! per-pod phase/readiness/log schedules and a recorded operation log,
//! plus a [`FakeDeployer`] that records apply order. Both are driven
//! entirely by the engine under test; combined with tokio's paused
//! clock they make every timing scenario deterministic.

pub mod fake_cluster;
pub mod fake_deployer;

pub use fake_cluster::{FakeCluster, FakePod, Op};
pub use fake_deployer::FakeDeployer;
