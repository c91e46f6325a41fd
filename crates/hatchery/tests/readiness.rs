//! Readiness state machine scenarios against the scripted fake cluster.
//!
//! All timing-sensitive tests run under tokio's paused clock, so poll
//! sleeps advance deterministically and assertions about tick counts
//! and deadlines are exact.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use hatchery::{Component, EnvError, ManifestOutput, ReadinessProbe, ReadyCheckData, POLL_INTERVAL};
use hatchery_test_utils::{FakeCluster, FakePod, Op};
use tokio_util::sync::CancellationToken;

fn ready_check(timeout: Duration) -> ReadyCheckData {
    ReadyCheckData {
        running_selector: "app=node".to_string(),
        log_selector: "app=node".to_string(),
        container: "node".to_string(),
        log_substring: "started".to_string(),
        timeout,
    }
}

fn output(namespace: &str, timeout: Duration) -> impl ManifestOutput {
    let component = Component::new("node", "").with_ready_check(ready_check(timeout));
    hatchery::ChartOutput::new(namespace, &component)
}

fn node_pod(name: &str) -> FakePod {
    FakePod::new(name)
        .with_label("app", "node")
        .with_container("node")
}

#[tokio::test(start_paused = true)]
async fn empty_selector_fails_fast_without_consuming_timeout() {
    let cluster = FakeCluster::new();
    let out = output("env-1", Duration::from_secs(600));

    let start = tokio::time::Instant::now();
    let probe = ReadinessProbe::new(&cluster, &out, CancellationToken::new()).unwrap();
    let err = probe.pods_running().await.unwrap_err();

    assert!(matches!(err, EnvError::NoMatchingPods { .. }));
    assert!(
        start.elapsed() < POLL_INTERVAL,
        "empty match must not wait out the timeout"
    );
}

#[tokio::test(start_paused = true)]
async fn empty_selector_fails_fast_in_log_phase() {
    let cluster = FakeCluster::new();
    let out = output("env-1", Duration::from_secs(600));

    let probe = ReadinessProbe::new(&cluster, &out, CancellationToken::new()).unwrap();
    let err = probe.log_substring().await.unwrap_err();
    assert!(matches!(err, EnvError::NoMatchingPods { .. }));
}

#[tokio::test(start_paused = true)]
async fn failed_pod_stops_polling_immediately() {
    let cluster = FakeCluster::new();
    cluster.add_pod("env-1", node_pod("node-0").with_phases(vec!["Pending", "Failed"]));
    let out = output("env-1", Duration::from_secs(600));

    let probe = ReadinessProbe::new(&cluster, &out, CancellationToken::new()).unwrap();
    let err = probe.pods_running().await.unwrap_err();

    assert!(matches!(err, EnvError::TerminalPhase { ref phase, .. } if phase.as_str() == "Failed"));
    // One enumeration list, two phase observations, nothing after.
    let gets = cluster
        .ops()
        .iter()
        .filter(|op| matches!(op, Op::GetPod { .. }))
        .count();
    assert_eq!(gets, 2, "no further ticks may occur after Failed");
    assert_eq!(cluster.ops().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn succeeded_pod_is_a_terminal_failure() {
    let cluster = FakeCluster::new();
    cluster.add_pod("env-1", node_pod("job-0").with_phases(vec!["Succeeded"]));
    let out = output("env-1", Duration::from_secs(600));

    let probe = ReadinessProbe::new(&cluster, &out, CancellationToken::new()).unwrap();
    let err = probe.pods_running().await.unwrap_err();
    assert!(matches!(err, EnvError::TerminalPhase { ref phase, .. } if phase.as_str() == "Succeeded"));
}

#[tokio::test(start_paused = true)]
async fn containers_ready_never_begins_before_all_pods_running() {
    let cluster = FakeCluster::new();
    cluster.add_pod(
        "env-1",
        node_pod("node-0").with_phases(vec!["Pending", "Pending", "Running"]),
    );
    cluster.add_pod(
        "env-1",
        node_pod("node-1").with_phases(vec!["Pending", "Running"]),
    );
    let out = output("env-1", Duration::from_secs(600));

    let probe = ReadinessProbe::new(&cluster, &out, CancellationToken::new()).unwrap();
    probe.wait_ready().await.unwrap();

    // Phase 2 re-lists pods; no list after the enumeration may happen
    // until every phase observation (get_pod) is done.
    let ops = cluster.ops();
    let last_get = ops
        .iter()
        .rposition(|op| matches!(op, Op::GetPod { .. }))
        .unwrap();
    let second_list = ops
        .iter()
        .enumerate()
        .filter(|(_, op)| matches!(op, Op::ListPods { .. }))
        .map(|(index, _)| index)
        .nth(1)
        .unwrap();
    assert!(
        last_get < second_list,
        "container readiness polling began before all pods were Running"
    );
}

#[tokio::test(start_paused = true)]
async fn two_pods_running_and_ready_within_three_ticks() {
    let cluster = FakeCluster::new();
    // Both pods leave Pending within one poll interval; container
    // readiness passes on the second containers-ready poll (the first
    // list observation is consumed by running-phase enumeration).
    cluster.add_pod(
        "env-1",
        node_pod("node-0")
            .with_phases(vec!["Pending", "Running"])
            .with_ready(vec![false, false, true]),
    );
    cluster.add_pod(
        "env-1",
        node_pod("node-1")
            .with_phases(vec!["Pending", "Running"])
            .with_ready(vec![false, false, true]),
    );
    let out = output("env-1", 10 * POLL_INTERVAL);

    let start = tokio::time::Instant::now();
    let probe = ReadinessProbe::new(&cluster, &out, CancellationToken::new()).unwrap();
    probe.wait_ready().await.unwrap();

    assert!(
        start.elapsed() <= 3 * POLL_INTERVAL,
        "expected readiness within 3 poll ticks, took {:?}",
        start.elapsed()
    );
}

#[tokio::test(start_paused = true)]
async fn log_check_times_out_after_exactly_five_intervals() {
    let cluster = FakeCluster::new();
    cluster.add_pod("env-1", node_pod("node-0").with_logs(vec!["listening\nstarted"]));
    cluster.add_pod("env-1", node_pod("node-1").with_logs(vec!["still booting"]));
    let out = output("env-1", 5 * POLL_INTERVAL);

    let start = tokio::time::Instant::now();
    let probe = ReadinessProbe::new(&cluster, &out, CancellationToken::new()).unwrap();
    let err = probe.log_substring().await.unwrap_err();

    assert!(matches!(err, EnvError::Timeout { .. }));
    assert_eq!(
        start.elapsed(),
        5 * POLL_INTERVAL,
        "timeout must fire at the deadline, not earlier"
    );
}

#[tokio::test(start_paused = true)]
async fn log_check_counts_one_match_per_pod() {
    let cluster = FakeCluster::new();
    // node-0 matches on the first tail; node-1 only on the second.
    // node-0 logging the substring twice must not cover for node-1.
    cluster.add_pod(
        "env-1",
        node_pod("node-0").with_logs(vec!["started\nstarted again"]),
    );
    cluster.add_pod("env-1", node_pod("node-1").with_logs(vec!["booting", "started"]));
    let out = output("env-1", 10 * POLL_INTERVAL);

    let start = tokio::time::Instant::now();
    let probe = ReadinessProbe::new(&cluster, &out, CancellationToken::new()).unwrap();
    probe.log_substring().await.unwrap();

    assert_eq!(start.elapsed(), POLL_INTERVAL);
}

#[tokio::test(start_paused = true)]
async fn fresh_tail_is_opened_every_tick() {
    let cluster = FakeCluster::new();
    cluster.add_pod(
        "env-1",
        node_pod("node-0").with_logs(vec!["", "", "started"]),
    );
    let out = output("env-1", 10 * POLL_INTERVAL);

    let probe = ReadinessProbe::new(&cluster, &out, CancellationToken::new()).unwrap();
    probe.log_substring().await.unwrap();

    let tails = cluster
        .ops()
        .iter()
        .filter(|op| matches!(op, Op::LogTail { .. }))
        .count();
    assert_eq!(tails, 3, "one bounded tail per poll tick");
}

#[tokio::test(start_paused = true)]
async fn cancellation_aborts_the_poll_loop() {
    let cluster = FakeCluster::new();
    cluster.add_pod("env-1", node_pod("node-0").with_phases(vec!["Pending"]));
    let out = output("env-1", Duration::from_secs(600));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let probe = ReadinessProbe::new(&cluster, &out, cancel).unwrap();
    let err = probe.pods_running().await.unwrap_err();
    assert!(matches!(err, EnvError::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn invalid_ready_check_is_rejected_at_construction() {
    let cluster = FakeCluster::new();
    let out = output("env-1", Duration::ZERO);
    let err = ReadinessProbe::new(&cluster, &out, CancellationToken::new()).unwrap_err();
    assert!(matches!(err, EnvError::Config(_)));
}
