//! Command implementations.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use stream_pipeline::config::InputConfig;
use stream_pipeline::{load_stream_configs_from_directory, Pipeline, StreamConfig, StreamManager};
use tracing::{error, info, warn};

/// Run one stream until its input ends or ctrl-c arrives.
pub async fn run_stream(path: &Path, shutdown_timeout: Duration) -> anyhow::Result<()> {
    let mut config = StreamConfig::from_file(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    if config.input == InputConfig::None {
        config.input = InputConfig::Stdin;
    }

    let pipeline = Pipeline::start(config)?;
    info!(config = %path.display(), "Running stream");

    // The configured source holds the only remaining input handle.
    pipeline.close_input();

    tokio::select! {
        result = pipeline.wait_for_drain(Duration::MAX) => {
            result?;
            info!("Input finished, stream drained");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt, stopping");
        }
    }

    pipeline.stop(shutdown_timeout).await?;
    log_metrics("main", &pipeline.metrics());
    Ok(())
}

/// Run every stream under `dir` until ctrl-c arrives.
pub async fn run_streams(
    dir: &Path,
    status_interval: Option<Duration>,
    shutdown_timeout: Duration,
) -> anyhow::Result<()> {
    let configs = load_stream_configs_from_directory(dir)
        .with_context(|| format!("failed to load streams from {}", dir.display()))?;
    if configs.is_empty() {
        bail!("no stream configs found in {}", dir.display());
    }

    let manager = StreamManager::new();
    if let Err(e) = manager.set_streams(configs, shutdown_timeout).await {
        error!(error = %e, "Some streams failed to start");
    }
    info!(streams = manager.stream_count().await, "Streams running");

    match status_interval {
        Some(period) => {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => report(&manager).await,
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
        }
    }

    info!("Received interrupt, stopping all streams");
    manager.stop_all(shutdown_timeout).await?;
    Ok(())
}

async fn report(manager: &StreamManager) {
    for id in manager.list().await.into_keys() {
        if let Ok(metrics) = manager.metrics(&id).await {
            log_metrics(&id, &metrics);
        }
    }
    let not_ready = manager.not_ready().await;
    if !not_ready.is_empty() {
        warn!(streams = ?not_ready, "Streams not ready");
    }
}

fn log_metrics(stream: &str, metrics: &stream_pipeline::PipelineMetrics) {
    match serde_json::to_string(metrics) {
        Ok(json) => info!(stream = %stream, metrics = %json, "Stream metrics"),
        Err(e) => warn!(stream = %stream, error = %e, "Failed to encode metrics"),
    }
}
