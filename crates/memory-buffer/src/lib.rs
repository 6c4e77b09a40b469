//! Memory buffer: a bounded FIFO between a producer and a consumer.
//!
//! ```text
//! producer --Transaction--> MemoryBuffer --Transaction--> consumer
//!      ^ ack on store         [queue]        ack shifts head ^
//!      | (held while over limit)             nack: redeliver head
//! ```
//!
//! The buffer acknowledges input as soon as it is stored, so the producer
//! is decoupled from the consumer's latency. Ordering is strict: only the
//! head entry is ever in flight and it is redelivered until accepted, so
//! nothing is dropped while the buffer runs. Entries still queued at
//! shutdown are discarded and reported in the log.

mod agent;
mod config;
mod error;
mod queue;

pub use agent::{BufferOutputs, MemoryBuffer, ERRORS_CHANNEL_CAPACITY};
pub use config::{BufferConfig, DEFAULT_LIMIT_BYTES, DEFAULT_RETRY_DELAY};
pub use error::{BufferError, BufferResult};
pub use queue::{BufferQueue, BufferStatus, BufferedEntry};

#[cfg(test)]
mod tests;
