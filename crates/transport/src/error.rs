//! Error types for transport connections.

use std::time::Duration;

use thiserror::Error;

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors raised by a transport or one of its connections.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The remote side closed the connection, or it was closed locally.
    #[error("connection closed")]
    ConnectionClosed,

    /// Establishing the connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The opening handshake did not finish within the deadline.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// The address cannot be used to connect.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A frame cannot be carried by this transport.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// I/O error on the underlying stream.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
