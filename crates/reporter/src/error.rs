//! Error types for the reporter.

use std::time::Duration;

use ethstats_protocol::{MessageType, ProtocolError};
use ethstats_transport::TransportError;
use thiserror::Error;

/// Result type for reporter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reporting.
#[derive(Debug, Error)]
pub enum Error {
    /// Dialing, sending or receiving failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The relay rejected the login.
    #[error("relay rejected login: {0}")]
    Unauthorized(String),

    /// The relay sent a frame only nodes send.
    #[error("unexpected {0} frame from relay")]
    UnexpectedMessage(MessageType),

    /// The reader task ended without a reason.
    #[error("reader stopped")]
    ReaderStopped,

    /// The reader task panicked.
    #[error("reader panicked")]
    ReaderPanicked,

    /// No `node-pong` arrived in time.
    #[error("no pong within {0:?}")]
    PongTimeout(Duration),

    /// HTTP request to the chain endpoint failed.
    #[error("HTTP request error: {0}")]
    HttpRequest(String),

    /// Chain response was not the expected JSON.
    #[error("JSON error: {0}")]
    Json(String),

    /// Chain endpoint returned a JSON-RPC error.
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// A timer period was zero.
    #[error("{0} must be greater than zero")]
    InvalidInterval(&'static str),

    /// A hex quantity could not be parsed.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::HttpRequest(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}
