//! Error types for the event store client.

use crate::types::{DropReason, EventNumber, WriteResult};
use std::time::Duration;
use thiserror::Error;

/// Main error type for client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("{operation} failed: {reason}")]
    StoreOperation {
        operation: &'static str,
        reason: String,
    },

    #[error("Subscription dropped: {0:?}")]
    SubscriptionDropped(DropReason),

    #[error("Timeout reached after {0:?}")]
    Timeout(Duration),

    #[error("Write rejected: {:?} ({})", .0.result, .0.message)]
    WriteConflict(Box<WriteResult>),

    #[error("Event sequence abandoned by its producer")]
    Abandoned,

    #[error("Invalid range: from {from} is after to {to}")]
    InvalidRange { from: EventNumber, to: EventNumber },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Build a store operation failure.
    pub fn store(operation: &'static str, reason: impl Into<String>) -> Self {
        ClientError::StoreOperation {
            operation,
            reason: reason.into(),
        }
    }

    /// Whether this error came from an expired deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout(_))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Config(e.to_string())
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
