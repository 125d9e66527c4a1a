use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use rawhttp_server::{run, Metrics, DEFAULT_ADDR};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let addr = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let metrics = Arc::new(Metrics::new());
    tokio::select! {
        result = run(listener, metrics.clone()) => result.context("accept loop failed")?,
        _ = tokio::signal::ctrl_c() => {
            let snapshot = metrics.snapshot();
            tracing::info!(
                requests = snapshot.requests_total,
                errors = snapshot.errors_total,
                mean_latency_us = snapshot.latency.mean().as_micros() as u64,
                "shutting down"
            );
        }
    }
    Ok(())
}
