//! Stream manager for running named pipelines side by side.

use crate::config::StreamConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::{Pipeline, PipelineMetrics};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};
use transaction_protocol::TransactionSender;

/// Status of a managed stream.
#[derive(Debug, Clone, Serialize)]
pub struct StreamInfo {
    pub active: bool,
    pub uptime: f64,
    pub uptime_str: String,
    pub config: StreamConfig,
}

impl StreamInfo {
    fn of(pipeline: &Pipeline) -> Self {
        let uptime = pipeline.uptime();
        Self {
            active: pipeline.is_running(),
            uptime: uptime.as_secs_f64(),
            uptime_str: format!("{:?}", uptime),
            config: pipeline.config().clone(),
        }
    }
}

/// Stream manager keyed by stream ID.
pub struct StreamManager {
    streams: RwLock<HashMap<String, Arc<Pipeline>>>,
}

impl StreamManager {
    pub fn new() -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
        }
    }

    /// Start a new stream under `id`.
    pub async fn create(&self, id: &str, config: StreamConfig) -> PipelineResult<()> {
        let mut streams = self.streams.write().await;
        if streams.contains_key(id) {
            return Err(PipelineError::StreamExists(id.to_string()));
        }

        let pipeline = Pipeline::start(config)?;
        streams.insert(id.to_string(), Arc::new(pipeline));

        info!(stream = %id, "Created stream");
        Ok(())
    }

    pub async fn read(&self, id: &str) -> PipelineResult<StreamInfo> {
        let streams = self.streams.read().await;
        streams
            .get(id)
            .map(|p| StreamInfo::of(p))
            .ok_or_else(|| PipelineError::StreamNotFound(id.to_string()))
    }

    /// Replace a stream's config: stop the old pipeline, then start anew.
    ///
    /// The registry lock is not held while the old pipeline drains; the
    /// stream is absent from `list` and `read` until the new one starts.
    pub async fn update(&self, id: &str, config: StreamConfig, timeout: Duration) -> PipelineResult<()> {
        let old = self
            .streams
            .write()
            .await
            .remove(id)
            .ok_or_else(|| PipelineError::StreamNotFound(id.to_string()))?;

        if let Err(e) = old.stop(timeout).await {
            warn!(stream = %id, error = %e, "Old pipeline did not stop cleanly");
        }

        self.create(id, config).await?;

        info!(stream = %id, "Updated stream");
        Ok(())
    }

    pub async fn delete(&self, id: &str, timeout: Duration) -> PipelineResult<()> {
        let pipeline = self
            .streams
            .write()
            .await
            .remove(id)
            .ok_or_else(|| PipelineError::StreamNotFound(id.to_string()))?;

        pipeline.stop(timeout).await?;

        info!(stream = %id, "Deleted stream");
        Ok(())
    }

    pub async fn list(&self) -> BTreeMap<String, StreamInfo> {
        let streams = self.streams.read().await;
        streams
            .iter()
            .map(|(id, p)| (id.clone(), StreamInfo::of(p)))
            .collect()
    }

    /// IDs of streams that are not ready, sorted.
    pub async fn not_ready(&self) -> Vec<String> {
        let streams = self.streams.read().await;
        let mut ids: Vec<String> = streams
            .iter()
            .filter(|(_, p)| !p.is_ready())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub async fn metrics(&self, id: &str) -> PipelineResult<PipelineMetrics> {
        let streams = self.streams.read().await;
        streams
            .get(id)
            .map(|p| p.metrics())
            .ok_or_else(|| PipelineError::StreamNotFound(id.to_string()))
    }

    /// Input handle of a stream.
    pub async fn input(&self, id: &str) -> PipelineResult<TransactionSender> {
        let streams = self.streams.read().await;
        streams
            .get(id)
            .ok_or_else(|| PipelineError::StreamNotFound(id.to_string()))?
            .input()
    }

    /// Make the running set match `configs`.
    ///
    /// Streams missing from `configs` are deleted, existing ones are
    /// updated and the rest are created. Every stream is attempted; the
    /// first error is returned.
    pub async fn set_streams(
        &self,
        configs: BTreeMap<String, StreamConfig>,
        timeout: Duration,
    ) -> PipelineResult<()> {
        let existing: Vec<String> = self.streams.read().await.keys().cloned().collect();
        let mut first_error = None;

        for id in existing.iter().filter(|id| !configs.contains_key(*id)) {
            if let Err(e) = self.delete(id, timeout).await {
                warn!(stream = %id, error = %e, "Failed to delete stream");
                first_error.get_or_insert(e);
            }
        }

        for (id, config) in configs {
            let result = if existing.contains(&id) {
                self.update(&id, config, timeout).await
            } else {
                self.create(&id, config).await
            };
            if let Err(e) = result {
                warn!(stream = %id, error = %e, "Failed to apply stream config");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Stop and remove every stream.
    pub async fn stop_all(&self, timeout: Duration) -> PipelineResult<()> {
        let drained: Vec<(String, Arc<Pipeline>)> = self.streams.write().await.drain().collect();
        let mut first_error = None;

        for (id, pipeline) in drained {
            if let Err(e) = pipeline.stop(timeout).await {
                warn!(stream = %id, error = %e, "Stream did not stop cleanly");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub async fn stream_count(&self) -> usize {
        self.streams.read().await.len()
    }
}

impl Default for StreamManager {
    fn default() -> Self {
        Self::new()
    }
}
