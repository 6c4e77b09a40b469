//! Stream pipelines: concrete sinks and processors, stream configuration,
//! and the lifecycle of running streams.
//!
//! A [`Pipeline`] wires an input handle (and optionally a line source)
//! through an optional [`memory_buffer::MemoryBuffer`] into a
//! [`fallback_output::FallbackOutput`]. The [`StreamManager`] keeps any
//! number of pipelines under string IDs.

pub mod config;
mod error;
pub mod interpolation;
mod manager;
mod pipeline;
pub mod processors;
pub mod sinks;
mod source;

pub use config::{load_stream_configs_from_directory, StreamConfig};
pub use error::{PipelineError, PipelineResult};
pub use interpolation::{InterpolatedString, InterpolationError};
pub use manager::{StreamInfo, StreamManager};
pub use pipeline::{Pipeline, PipelineMetrics};
pub use source::{LineSource, SourceStats};
