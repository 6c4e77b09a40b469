//! Sinks that never deliver anywhere.

use async_trait::async_trait;
use fallback_output::{Sink, SinkError};
use transaction_protocol::Message;

/// Accepts and discards every message.
pub struct DropSink {
    label: String,
}

impl DropSink {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
        }
    }
}

#[async_trait]
impl Sink for DropSink {
    fn label(&self) -> &str {
        &self.label
    }

    async fn attempt(&self, _message: &Message) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Fails every message with a fixed reason.
pub struct RejectSink {
    label: String,
    reason: String,
}

impl RejectSink {
    pub fn new(label: &str, reason: &str) -> Self {
        Self {
            label: label.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl Sink for RejectSink {
    fn label(&self) -> &str {
        &self.label
    }

    async fn attempt(&self, _message: &Message) -> Result<(), SinkError> {
        Err(SinkError::Rejected(self.reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drop_accepts() {
        let sink = DropSink::new("drop");
        assert!(sink.attempt(&Message::from_bytes(["x"])).await.is_ok());
    }

    #[tokio::test]
    async fn test_reject_fails_with_reason() {
        let sink = RejectSink::new("reject", "maintenance");
        let err = sink.attempt(&Message::from_bytes(["x"])).await.unwrap_err();
        assert_eq!(err.to_string(), "Rejected: maintenance");
    }
}
