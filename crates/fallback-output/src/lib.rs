//! Fallback output: ordered failover across delivery targets.
//!
//! ```text
//!                      +-> [processors] -> sink A   (try first)
//! Transaction -> route +-> [processors] -> sink B   (if A failed)
//!                      +-> [processors] -> sink C   (if B failed)
//! ```
//!
//! Each inbound transaction is acknowledged exactly once: success as soon
//! as one target accepts (or its processors leave nothing to send), or the
//! last target's error once every target has failed.
//!
//! The [`Sink`] and [`Processor`] traits are the seams concrete adapters
//! plug into.

mod error;
mod metrics;
mod processor;
mod router;
mod sink;
mod target;

pub use error::{FallbackError, FallbackResult, ProcessError, SinkError};
pub use metrics::{RouterMetrics, TargetMetrics};
pub use processor::{Processor, ProcessorChain};
pub use router::{FallbackOutput, DEFAULT_MAX_IN_FLIGHT};
pub use sink::Sink;
pub use target::FallbackTarget;

#[cfg(test)]
mod tests;
