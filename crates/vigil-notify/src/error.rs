//! Error types for notification delivery.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid mail address {address:?}: {reason}")]
    Address { address: String, reason: String },

    #[error("failed to build message: {0}")]
    Message(String),

    #[error("smtp delivery failed: {0}")]
    Smtp(String),

    #[error("webhook delivery failed: {0}")]
    Webhook(String),

    #[error("webhook answered with status {0}")]
    Status(u16),
}
