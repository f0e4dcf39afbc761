//! Error types for alert delivery.

use thiserror::Error;

/// Result type for alert operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when delivering an alert.
#[derive(Debug, Error)]
pub enum Error {
    /// The mailer is missing settings it needs to deliver.
    #[error("mailer not configured: {0}")]
    NotConfigured(String),

    /// Delivery was attempted and failed.
    #[error("alert delivery failed: {0}")]
    Delivery(String),
}
