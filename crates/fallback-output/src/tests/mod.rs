//! Tests for the fallback router.
//!
//! - `harness.rs`  - Scripted sinks and small processors
//! - `routing.rs`  - Target order, exhaustion, filtering and metrics
//! - `copies.rs`   - Every attempt starts from the original message
//! - `consume.rs`  - Transaction handling and bounded concurrency
//! - `shutdown.rs` - Closing with routings in flight

mod copies;
mod routing;
