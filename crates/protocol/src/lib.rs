//! Wire protocol spoken between reporters, the relay and dashboards.
//!
//! Every frame is a JSON object with a single `emit` key holding
//! `[type, payload?]`. [`Frame::decode`] checks the envelope and resolves the
//! type; [`Frame::message`] then decodes the payload into a [`Message`].
//! Unknown types are rejected rather than skipped.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod message;
mod stats;

pub use error::{ProtocolError, Result};
pub use message::{Frame, Hello, Latency, Message, MessageType, NodePing, NodeStatus};
pub use stats::{Block, NodeInfo, Stats};
