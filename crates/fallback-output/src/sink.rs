//! The sink capability: something that accepts or refuses a whole message.

use crate::error::SinkError;
use async_trait::async_trait;
use transaction_protocol::Message;

/// A delivery destination.
///
/// A message is the batch unit: `attempt` either accepts every part or
/// fails as a whole. Retrying within one destination is the sink's own
/// business; the router only sees the final outcome.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Name used in logs, metrics and rejection errors.
    fn label(&self) -> &str;

    async fn attempt(&self, message: &Message) -> Result<(), SinkError>;

    /// Whether the destination is currently reachable.
    fn connected(&self) -> bool {
        true
    }
}
