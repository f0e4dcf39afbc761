//! Transport abstraction for ethstats connections.
//!
//! A connection carries whole JSON text frames in both directions. Reads and
//! writes are independent: implementations guard each half with its own lock,
//! so a task parked in [`Connection::recv`] never holds up a concurrent
//! [`Connection::send`] issued by another task.
//!
//! Concrete transports live in separate crates (`ethstats-transport-ws`,
//! `ethstats-transport-memory`).
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::{Result, TransportError};

use std::fmt::Debug;
use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

/// A bidirectional, message-oriented connection.
#[async_trait]
pub trait Connection: Debug + Send + Sync + 'static {
    /// Send one frame.
    async fn send(&self, data: Bytes) -> Result<()>;

    /// Receive the next frame, waiting until one arrives.
    async fn recv(&self) -> Result<Bytes>;

    /// Close the connection.
    ///
    /// Parked and later calls to `send`/`recv` fail with
    /// [`TransportError::ConnectionClosed`].
    async fn close(&self) -> Result<()>;

    /// Address of the remote peer, stable for the life of the connection.
    fn remote_addr(&self) -> SocketAddr;
}

/// Outbound side of a transport.
#[async_trait]
pub trait Transport: Debug + Send + Sync + 'static {
    /// Open a connection to `url`.
    async fn connect(&self, url: &Url) -> Result<Box<dyn Connection>>;
}

/// Inbound side of a transport.
#[async_trait]
pub trait Listener: Debug + Send + Sync + 'static {
    /// Wait for the next inbound connection.
    async fn accept(&self) -> Result<Box<dyn Connection>>;
}
