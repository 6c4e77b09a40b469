//! Error types for the fallback router and its seams.

use std::time::Duration;
use thiserror::Error;

/// Router lifecycle error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FallbackError {
    #[error("Fallback output requires at least one target")]
    NoTargets,

    #[error("Fallback output is already consuming")]
    AlreadyStarted,

    #[error("Fallback output has been closed")]
    Closed,

    #[error("Timed out after {0:?} waiting for the fallback output to close")]
    Timeout(Duration),
}

/// Error returned by a sink attempt.
#[derive(Error, Debug)]
pub enum SinkError {
    /// The sink cannot reach its destination right now
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// The destination refused the batch
    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Error returned by a processor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Processor '{processor}' failed: {reason}")]
pub struct ProcessError {
    pub processor: String,
    pub reason: String,
}

impl ProcessError {
    pub fn new(processor: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            processor: processor.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for router lifecycle operations.
pub type FallbackResult<T> = Result<T, FallbackError>;
