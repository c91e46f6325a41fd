//! Quick two-component debug environment, torn down on ctrl-c.
//!
//! Demonstrates the entry-point wiring: tracing init and the
//! signal-to-cancellation bridge both live here, outside the engine.

use std::time::Duration;

use hatchery::{
    ClusterClient, Component, Environment, EnvironmentConfig, KubectlDeployer, ReadyCheckData,
};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const GETH_MANIFEST: &str = r"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: geth
  labels:
    app: geth
spec:
  replicas: 1
  selector:
    matchLabels:
      app: geth
  template:
    metadata:
      labels:
        app: geth
    spec:
      containers:
        - name: geth
          image: ethereum/client-go:stable
          args: [--dev, --http, --http.addr=0.0.0.0]
";

const NODE_MANIFEST: &str = r"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: node
  labels:
    app: node
spec:
  replicas: 2
  selector:
    matchLabels:
      app: node
  template:
    metadata:
      labels:
        app: node
    spec:
      containers:
        - name: node
          image: smartcontract/chainlink:latest
";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hatchery=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Bridge SIGINT to the cancellation token once, here at the entry
    // point; the engine itself only ever sees the token.
    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal.cancel();
        }
    });

    let cluster = ClusterClient::connect().await?;

    let mut config = EnvironmentConfig::new("evm-dev");
    config.remove_on_interrupt = true;

    let env = Environment::new(config)
        .with_component(
            Component::new("geth", GETH_MANIFEST)
                .with_ready_check(ReadyCheckData {
                    running_selector: "app=geth".into(),
                    log_selector: "app=geth".into(),
                    container: "geth".into(),
                    log_substring: "HTTP server started".into(),
                    timeout: Duration::from_secs(180),
                })
                .with_endpoint("geth.{namespace}.svc:8545"),
        )
        .with_component(
            Component::new("node", NODE_MANIFEST)
                .with_values(serde_json::json!({
                    "resources": { "requests": { "cpu": "350m" } },
                    "db": { "stateful": true, "capacity": "5Gi" },
                }))
                .with_ready_check(ReadyCheckData {
                    running_selector: "app=node".into(),
                    log_selector: "app=node".into(),
                    container: "node".into(),
                    log_substring: "Listening and serving HTTP".into(),
                    timeout: Duration::from_secs(300),
                })
                .with_endpoint("node.{namespace}.svc:6688"),
        )
        .run(&cluster, &KubectlDeployer::default(), cancel.clone())
        .await?;

    info!(namespace = %env.namespace(), connections = ?env.connections(), "environment ready");

    // Park until interrupted, then clean up.
    cancel.cancelled().await;
    env.teardown(&cluster).await?;
    Ok(())
}
