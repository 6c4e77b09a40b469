//! Acknowledgement outcomes.

use thiserror::Error;

/// Why a transaction was not accepted downstream.
///
/// Errors are compared by value so that stages can deduplicate repeated
/// failures of the same kind.
#[derive(Error, Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeliveryError {
    /// A delivery target refused the message.
    #[error("Delivery rejected by {target}: {reason}")]
    Rejected { target: String, reason: String },

    /// Transactions must carry at least one part.
    #[error("Transaction carries an empty message")]
    EmptyMessage,

    /// The acknowledgement handle was dropped without a response.
    #[error("Acknowledgement handle dropped without a response")]
    Abandoned,

    /// The receiving stage is shutting down and will not deliver.
    #[error("Stage is shutting down")]
    ShuttingDown,

    /// The delivery path was closed before the transaction was taken.
    #[error("Delivery path is closed")]
    Closed,
}

impl DeliveryError {
    /// Build a rejection attributed to a named target.
    pub fn rejected(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::Rejected {
            target: target.into(),
            reason: reason.to_string(),
        }
    }
}

/// The single outcome sent back on an acknowledgement handle.
pub type Response = Result<(), DeliveryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_rejected_display() {
        let err = DeliveryError::rejected("http_client", "connection refused");
        assert_eq!(
            err.to_string(),
            "Delivery rejected by http_client: connection refused"
        );
    }

    #[test]
    fn test_errors_deduplicate_by_value() {
        let mut seen = HashSet::new();
        assert!(seen.insert(DeliveryError::rejected("a", "boom")));
        assert!(!seen.insert(DeliveryError::rejected("a", "boom")));
        assert!(seen.insert(DeliveryError::rejected("b", "boom")));
        assert!(seen.insert(DeliveryError::Abandoned));
        assert_eq!(seen.len(), 3);
    }
}
