//! Transaction protocol: the unit of transport between pipeline stages.
//!
//! A [`Transaction`] carries a [`Message`] together with a single-use
//! [`AckHandle`] back to whoever created it. Every stage that receives a
//! transaction becomes solely responsible for resolving that handle, either
//! directly or by delegating to a downstream transaction it originates.
//!
//! # Contract
//!
//! 1. **Handoff**: a sender suspends until the receiving stage takes the
//!    transaction ([`transaction_channel`] has a capacity of one).
//! 2. **Exactly one ack**: [`AckHandle::resolve`] consumes the handle, so a
//!    second acknowledgement does not compile.
//! 3. **Safety net**: a handle dropped without a response is logged as a
//!    protocol violation and resolves as [`DeliveryError::Abandoned`].
//! 4. **Close**: the delivery path is closed by dropping every sender.
//!
//! ```text
//! producer --Transaction--> stage --Transaction--> stage
//!     ^                       |  ^                    |
//!     |______ Response <______|  |____ Response <_____|
//! ```

mod error;
mod message;
mod transaction;

pub use error::{DeliveryError, Response};
pub use message::{Message, Part};
pub use transaction::{
    transaction_channel, AckHandle, AckReceiver, SendPermit, Transaction, TransactionReceiver,
    TransactionSender, HANDOFF_CAPACITY,
};
