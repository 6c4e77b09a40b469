//! Behavioural tests for the memory buffer.
//!
//! - `harness.rs`     - Buffer wiring, a scripted consumer and helpers
//! - `ordering.rs`    - FIFO delivery and draining on input close
//! - `backpressure.rs` - Held acknowledgements while over the limit
//! - `failures.rs`    - Redelivery of a rejected head and error publishing
//! - `shutdown.rs`    - Closing with and without work in flight

mod ordering;
mod shutdown;
