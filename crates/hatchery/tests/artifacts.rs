//! Artifact extraction tests.

#![allow(clippy::unwrap_used)]

use hatchery::Artifacts;
use hatchery_test_utils::{FakeCluster, FakePod};

#[tokio::test]
async fn dump_writes_one_file_per_pod_container() {
    let cluster = FakeCluster::new();
    cluster.add_pod(
        "env-1",
        FakePod::new("node-0")
            .with_container("node")
            .with_logs(vec!["chain synced\nstarted"]),
    );
    cluster.add_pod(
        "env-1",
        FakePod::new("db-0")
            .with_container("postgres")
            .with_logs(vec!["ready to accept connections"]),
    );

    let dir = tempfile::tempdir().unwrap();
    let artifacts = Artifacts::new(&cluster, "env-1").await.unwrap();
    let out_dir = artifacts.dump(dir.path()).await.unwrap();

    assert_eq!(out_dir, dir.path().join("env-1"));
    let node_log = std::fs::read_to_string(out_dir.join("node-0_node.log")).unwrap();
    assert!(node_log.contains("started"));
    let db_log = std::fs::read_to_string(out_dir.join("db-0_postgres.log")).unwrap();
    assert!(db_log.contains("accept connections"));
}

#[tokio::test]
async fn dump_of_empty_namespace_creates_empty_directory() {
    let cluster = FakeCluster::new();
    let dir = tempfile::tempdir().unwrap();

    let artifacts = Artifacts::new(&cluster, "env-empty").await.unwrap();
    let out_dir = artifacts.dump(dir.path()).await.unwrap();

    assert!(out_dir.is_dir());
    assert_eq!(std::fs::read_dir(&out_dir).unwrap().count(), 0);
}
