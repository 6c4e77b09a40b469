//! Built-in sinks and the factory that builds a router from config.

mod discard;
mod file;
mod files;
mod http_client;
mod stdout;

pub use discard::{DropSink, RejectSink};
pub use file::FileSink;
pub use files::FilesSink;
pub use http_client::HttpClientSink;
pub use stdout::StdoutSink;

use crate::config::{OutputConfig, OutputKind};
use crate::error::{PipelineError, PipelineResult};
use crate::processors::build_chain;
use fallback_output::{FallbackTarget, Sink};
use std::sync::Arc;

/// Build the sink for a single, non-fallback output.
pub fn build_sink(label: &str, kind: &OutputKind) -> PipelineResult<Arc<dyn Sink>> {
    let sink: Arc<dyn Sink> = match kind {
        OutputKind::File { path } => Arc::new(FileSink::new(label, path)),
        OutputKind::Files { path } => Arc::new(FilesSink::new(label, path)?),
        OutputKind::HttpClient(config) => Arc::new(HttpClientSink::new(label, config)?),
        OutputKind::Stdout => Arc::new(StdoutSink::new(label)),
        OutputKind::Drop => Arc::new(DropSink::new(label)),
        OutputKind::Reject { reason } => Arc::new(RejectSink::new(label, reason)),
        OutputKind::Fallback { .. } => {
            return Err(PipelineError::config("fallback outputs cannot be nested"));
        }
    };
    Ok(sink)
}

/// Expand an output config into the ordered targets of a router.
///
/// A fallback yields one target per child output; anything else is a
/// router with a single target.
pub fn build_targets(output: &OutputConfig) -> PipelineResult<Vec<FallbackTarget>> {
    match &output.kind {
        OutputKind::Fallback { outputs } => outputs
            .iter()
            .enumerate()
            .map(|(index, child)| {
                let label = child
                    .label
                    .clone()
                    .unwrap_or_else(|| format!("fallback.{}.{}", index, child.kind.type_name()));
                build_target(label, child)
            })
            .collect(),
        kind => {
            let label = output
                .label
                .clone()
                .unwrap_or_else(|| kind.type_name().to_string());
            Ok(vec![build_target(label, output)?])
        }
    }
}

fn build_target(label: String, output: &OutputConfig) -> PipelineResult<FallbackTarget> {
    let sink = build_sink(&label, &output.kind)?;
    let processors = build_chain(&output.processors)?;
    Ok(FallbackTarget::new(sink).with_processors(processors))
}
