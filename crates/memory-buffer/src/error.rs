//! Error types for the memory buffer.

use std::time::Duration;
use thiserror::Error;

/// Memory buffer error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// `start` was called on a buffer that is already running
    #[error("Buffer has already been started")]
    AlreadyStarted,

    /// `start` was called after `close_async`
    #[error("Buffer has been closed")]
    Closed,

    /// Draining did not finish before the caller's deadline
    #[error("Timed out after {0:?} waiting for the buffer to close")]
    Timeout(Duration),
}

/// Result type for buffer operations.
pub type BufferResult<T> = Result<T, BufferError>;
