//! Error types for stream pipelines.

use crate::interpolation::InterpolationError;
use fallback_output::FallbackError;
use memory_buffer::BufferError;
use std::time::Duration;
use thiserror::Error;
use transaction_protocol::DeliveryError;

/// Pipeline error type.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Interpolation error: {0}")]
    Interpolation(#[from] InterpolationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("Output error: {0}")]
    Output(#[from] FallbackError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Stream already exists: {0}")]
    StreamExists(String),

    #[error("Stream not found: {0}")]
    StreamNotFound(String),

    #[error("Pipeline is not running")]
    NotRunning,

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::StreamNotFound("foo".into());
        assert_eq!(err.to_string(), "Stream not found: foo");

        let err = PipelineError::config("nested fallback");
        assert_eq!(err.to_string(), "Invalid configuration: nested fallback");
    }

    #[test]
    fn test_from_buffer_error() {
        let err: PipelineError = BufferError::AlreadyStarted.into();
        assert!(matches!(err, PipelineError::Buffer(BufferError::AlreadyStarted)));
    }
}
