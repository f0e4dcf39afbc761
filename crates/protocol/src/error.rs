//! Error types for the wire protocol.

use thiserror::Error;

use crate::MessageType;

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not a `{"emit": [...]}` object.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(#[source] serde_json::Error),

    /// The `emit` array is empty or its first element is not a string.
    #[error("envelope carries no message type")]
    MissingType,

    /// The message type is not part of the protocol.
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// A message type that requires a payload arrived without one.
    #[error("missing payload for {0}")]
    MissingPayload(MessageType),

    /// The payload does not match the shape of its message type.
    #[error("invalid {message_type} payload: {source}")]
    InvalidPayload {
        /// Type of the message whose payload failed.
        message_type: MessageType,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// Serialising an outgoing message failed.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}
