//! In-memory transport implementation for testing
//!
//! Connections are pairs of bounded channels inside one process. A
//! [`MemoryTransport`] keeps a registry of listeners keyed by URL, so a reporter
//! dialing `ws://relay/` reaches whichever test task called
//! [`MemoryTransport::listen`] for that URL.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::fmt::Debug;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use ethstats_transport::{Connection, Listener, Result, Transport, TransportError};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

/// Frames buffered per direction before `send` waits.
const CHANNEL_CAPACITY: usize = 100;

/// Source of synthetic remote ports, so every connection gets a distinct address.
static NEXT_PORT: AtomicU16 = AtomicU16::new(20_000);

fn next_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, NEXT_PORT.fetch_add(1, Ordering::Relaxed)))
}

/// Memory transport implementation
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    listeners: Arc<DashMap<String, flume::Sender<Box<dyn Connection>>>>,
}

impl MemoryTransport {
    /// Create a transport with an empty listener registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for `url`, replacing any previous one.
    #[must_use]
    pub fn listen(&self, url: &Url) -> MemoryListener {
        let (incoming_tx, incoming_rx) = flume::unbounded();
        self.listeners.insert(url.to_string(), incoming_tx);

        info!("Memory listener created for {}", url);

        MemoryListener { incoming_rx }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Connection>> {
        debug!("Connecting to memory listener {}", url);

        let incoming_tx = self
            .listeners
            .get(url.as_str())
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TransportError::ConnectionFailed(format!("No listener for {url}")))?;

        let (client_conn, server_conn) = MemoryConnection::pair();

        incoming_tx
            .send_async(Box::new(server_conn))
            .await
            .map_err(|_| TransportError::ConnectionFailed("Listener closed".to_string()))?;

        Ok(Box::new(client_conn))
    }
}

/// Listener side of a [`MemoryTransport`] registration.
#[derive(Debug)]
pub struct MemoryListener {
    incoming_rx: flume::Receiver<Box<dyn Connection>>,
}

#[async_trait]
impl Listener for MemoryListener {
    async fn accept(&self) -> Result<Box<dyn Connection>> {
        self.incoming_rx
            .recv_async()
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }
}

/// One end of an in-memory connection.
pub struct MemoryConnection {
    sender: Mutex<Option<flume::Sender<Bytes>>>,
    receiver: tokio::sync::Mutex<flume::Receiver<Bytes>>,
    remote_addr: SocketAddr,
    closed: CancellationToken,
}

impl MemoryConnection {
    /// Create two connected ends. Frames sent on one are received on the other.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (a_to_b_tx, a_to_b_rx) = flume::bounded(CHANNEL_CAPACITY);
        let (b_to_a_tx, b_to_a_rx) = flume::bounded(CHANNEL_CAPACITY);

        // Each end reports the other end's address as its remote
        let a_addr = next_addr();
        let b_addr = next_addr();

        let a = Self::new(a_to_b_tx, b_to_a_rx, b_addr);
        let b = Self::new(b_to_a_tx, a_to_b_rx, a_addr);
        (a, b)
    }

    fn new(
        sender: flume::Sender<Bytes>,
        receiver: flume::Receiver<Bytes>,
        remote_addr: SocketAddr,
    ) -> Self {
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: tokio::sync::Mutex::new(receiver),
            remote_addr,
            closed: CancellationToken::new(),
        }
    }
}

impl Debug for MemoryConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConnection")
            .field("remote_addr", &self.remote_addr)
            .field("closed", &self.closed.is_cancelled())
            .finish()
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn send(&self, data: Bytes) -> Result<()> {
        let sender = self
            .sender
            .lock()
            .clone()
            .ok_or(TransportError::ConnectionClosed)?;

        sender
            .send_async(data)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn recv(&self) -> Result<Bytes> {
        let receiver = self.receiver.lock().await;
        tokio::select! {
            biased;
            () = self.closed.cancelled() => Err(TransportError::ConnectionClosed),
            received = receiver.recv_async() => {
                received.map_err(|_| TransportError::ConnectionClosed)
            }
        }
    }

    async fn close(&self) -> Result<()> {
        debug!("Closing memory connection to {}", self.remote_addr);
        self.closed.cancel();
        // Dropping our sender disconnects the peer's receiver
        self.sender.lock().take();
        Ok(())
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}
