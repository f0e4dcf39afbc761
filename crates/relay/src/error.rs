//! Error types for the relay.

use thiserror::Error;

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the relay.
#[derive(Debug, Error)]
pub enum Error {
    /// The relay was started twice.
    #[error("relay already started")]
    AlreadyStarted,

    /// Binding the listen socket failed.
    #[error("failed to bind relay listener: {0}")]
    Bind(#[source] std::io::Error),

    /// A ticker period was zero.
    #[error("{0} must be greater than zero")]
    InvalidInterval(&'static str),

    /// The hub task is gone, so the request could not be delivered.
    #[error("hub is not running")]
    HubClosed,
}
