//! A running stream: `input -> [memory buffer] -> fallback output`.

use crate::config::{InputConfig, StreamConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::sinks::build_targets;
use crate::source::{LineSource, SourceStats};
use fallback_output::{FallbackOutput, RouterMetrics};
use memory_buffer::{BufferStatus, MemoryBuffer};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use transaction_protocol::{transaction_channel, DeliveryError, TransactionSender};

/// Snapshot of a pipeline's counters.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineMetrics {
    pub uptime_secs: f64,
    pub buffer: Option<BufferStatus>,
    pub output: RouterMetrics,
    /// Distinct failures the buffer reported while redelivering
    pub buffer_delivery_errors: u64,
}

/// The stages of one stream, wired together and running.
pub struct Pipeline {
    config: StreamConfig,
    input: Mutex<Option<TransactionSender>>,
    buffer: Option<MemoryBuffer>,
    output: FallbackOutput,
    source: Mutex<Option<JoinHandle<PipelineResult<SourceStats>>>>,
    buffer_errors: Arc<AtomicU64>,
    started_at: Instant,
    closing: AtomicBool,
}

impl Pipeline {
    /// Build every stage from `config` and start them.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: StreamConfig) -> PipelineResult<Self> {
        config.validate()?;

        let targets = build_targets(&config.output)?;
        let output = FallbackOutput::new(targets)?.with_max_in_flight(config.pipeline.max_in_flight);

        let (input_tx, input_rx) = transaction_channel();
        let source = spawn_source(&config.input, &input_tx)?;
        let buffer_errors = Arc::new(AtomicU64::new(0));

        let buffer = match config.buffer.to_buffer_config() {
            Some(buffer_config) => {
                let buffer = MemoryBuffer::new(buffer_config);
                let outputs = buffer.start(input_rx)?;
                tokio::spawn(count_buffer_errors(outputs.errors, buffer_errors.clone()));
                output.consume(outputs.transactions)?;
                Some(buffer)
            }
            None => {
                output.consume(input_rx)?;
                None
            }
        };

        info!(
            output = config.output.kind.type_name(),
            buffered = buffer.is_some(),
            "Pipeline started"
        );

        Ok(Self {
            config,
            input: Mutex::new(Some(input_tx)),
            buffer,
            output,
            source: Mutex::new(source),
            buffer_errors,
            started_at: Instant::now(),
            closing: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// A handle for delivering messages into the pipeline.
    pub fn input(&self) -> PipelineResult<TransactionSender> {
        self.input.lock().clone().ok_or(PipelineError::NotRunning)
    }

    /// Give up the pipeline's own input handle.
    ///
    /// Once every other handle (including the configured source) is gone,
    /// the stages drain and close on their own.
    pub fn close_input(&self) {
        self.input.lock().take();
    }

    /// Wait for the stages to finish after the input closed.
    pub async fn wait_for_drain(&self, timeout: Duration) -> PipelineResult<()> {
        self.output
            .wait_for_close(timeout)
            .await
            .map_err(|_| PipelineError::Timeout(timeout))
    }

    /// Stop every stage, waiting at most `timeout` for in-flight work.
    ///
    /// Messages still queued in the buffer are discarded.
    pub async fn stop(&self, timeout: Duration) -> PipelineResult<()> {
        self.closing.store(true, Ordering::SeqCst);
        let deadline = tokio::time::Instant::now() + timeout;

        self.close_input();
        if let Some(source) = self.source.lock().take() {
            source.abort();
        }

        // The output keeps acknowledging while the buffer finishes its
        // in-flight delivery.
        if let Some(buffer) = &self.buffer {
            buffer.close_async();
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if buffer.wait_for_close(remaining).await.is_err() {
                warn!("Buffer did not close in time, closing output anyway");
                self.output.close_async();
                return Err(PipelineError::Timeout(timeout));
            }
        }

        self.output.close_async();
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        self.output
            .wait_for_close(remaining)
            .await
            .map_err(|_| PipelineError::Timeout(timeout))?;

        info!(uptime_secs = self.uptime().as_secs_f64(), "Pipeline stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        !self.output.is_closed()
    }

    /// Running, not stopping, and every sink reachable.
    pub fn is_ready(&self) -> bool {
        !self.closing.load(Ordering::SeqCst)
            && self.is_running()
            && self.buffer.as_ref().map_or(true, |b| !b.is_closed())
            && self.output.connected()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn metrics(&self) -> PipelineMetrics {
        PipelineMetrics {
            uptime_secs: self.uptime().as_secs_f64(),
            buffer: self.buffer.as_ref().map(|b| b.status()),
            output: self.output.metrics(),
            buffer_delivery_errors: self.buffer_errors.load(Ordering::Relaxed),
        }
    }
}

async fn count_buffer_errors(mut errors: mpsc::Receiver<Vec<DeliveryError>>, count: Arc<AtomicU64>) {
    while let Some(batch) = errors.recv().await {
        count.fetch_add(batch.len() as u64, Ordering::Relaxed);
        for err in batch {
            warn!(error = %err, "Buffered message could not be delivered, retrying");
        }
    }
}

fn spawn_source(
    input: &InputConfig,
    sender: &TransactionSender,
) -> PipelineResult<Option<JoinHandle<PipelineResult<SourceStats>>>> {
    let handle = match input {
        InputConfig::None => return Ok(None),
        InputConfig::Stdin => {
            let source = LineSource::new(BufReader::new(tokio::io::stdin()), sender.clone());
            tokio::spawn(run_source(source))
        }
        InputConfig::File { path } => {
            let file = std::fs::File::open(path)?;
            let reader = BufReader::new(tokio::fs::File::from_std(file));
            let source = LineSource::new(reader, sender.clone());
            tokio::spawn(run_source(source))
        }
    };
    Ok(Some(handle))
}

async fn run_source<R>(source: LineSource<R>) -> PipelineResult<SourceStats>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let result = source.run().await;
    match &result {
        Ok(stats) => info!(
            delivered = stats.delivered,
            rejected = stats.rejected,
            "Source finished"
        ),
        Err(e) => warn!(error = %e, "Source failed"),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use transaction_protocol::Message;

    /// Answers every request with a 500 after `delay`.
    async fn slow_failing_server(delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let (mut stream, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = stream.read(&mut buf).await;
                    tokio::time::sleep(delay).await;
                    let response = "HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        format!("http://{addr}/slow")
    }

    #[tokio::test]
    async fn test_stop_timeout_still_closes_output() {
        let url = slow_failing_server(Duration::from_millis(300)).await;
        let config = StreamConfig::from_json(&format!(
            r#"{{
                "buffer": {{ "type": "memory" }},
                "output": {{ "type": "http_client", "url": "{url}", "retry": {{ "max_retries": 0 }} }}
            }}"#
        ))
        .unwrap();
        let pipeline = Pipeline::start(config).unwrap();

        let input = pipeline.input().unwrap();
        assert_eq!(input.deliver(Message::from_bytes(["x"])).await, Ok(()));
        drop(input);

        // Let the buffer hand the entry to the slow request.
        tokio::time::timeout(Duration::from_secs(5), async {
            while pipeline.metrics().output.targets[0].attempts == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let short = Duration::from_millis(50);
        assert!(matches!(
            pipeline.stop(short).await,
            Err(PipelineError::Timeout(t)) if t == short
        ));
        assert!(pipeline.output.is_closing());

        // Once the request fails the buffer exits and the output follows.
        pipeline.wait_for_drain(Duration::from_secs(5)).await.unwrap();
        assert!(!pipeline.is_running());
    }
}
