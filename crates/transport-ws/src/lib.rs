//! WebSocket transport for ethstats.
//!
//! - For listening: [`WebSocketListener`] provides an Axum router that can be
//!   merged into an existing server; upgraded sockets are handed out through
//!   [`Listener::accept`].
//! - For connecting: [`WebSocketTransport`] dials `ws://` URLs with a bounded
//!   opening handshake.
//!
//! Frames travel as WebSocket text messages. Both connection kinds split the
//! socket into its sink and stream halves, each behind its own lock.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::fmt::Debug;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::extract::ws::{self, WebSocket};
use axum::extract::{ConnectInfo, WebSocketUpgrade};
use axum::routing::get;
use bytes::Bytes;
use ethstats_transport::{Connection, Listener, Result, Transport, TransportError};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use url::Url;

/// Deadline for the opening handshake of outbound connections.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(120);

/// Capacity of the queue between the Axum handler and `accept`.
const ACCEPT_QUEUE_SIZE: usize = 100;

type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn text_frame(data: &Bytes) -> Result<String> {
    std::str::from_utf8(data)
        .map(str::to_owned)
        .map_err(|e| TransportError::InvalidFrame(format!("frame is not UTF-8: {e}")))
}

/// Outbound WebSocket transport.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    handshake_timeout: Duration,
}

impl WebSocketTransport {
    /// Create a transport using [`HANDSHAKE_TIMEOUT`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            handshake_timeout: HANDSHAKE_TIMEOUT,
        }
    }

    /// Override the opening handshake deadline.
    #[must_use]
    pub const fn with_handshake_timeout(mut self, handshake_timeout: Duration) -> Self {
        self.handshake_timeout = handshake_timeout;
        self
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Connection>> {
        // Built without a TLS stack, so only plain `ws` can be dialed
        if url.scheme() != "ws" {
            return Err(TransportError::InvalidAddress(format!(
                "unsupported scheme in {url}"
            )));
        }

        debug!("Connecting to WebSocket at {}", url);

        let (ws_stream, _) = tokio::time::timeout(self.handshake_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| TransportError::HandshakeTimeout(self.handshake_timeout))?
            .map_err(|e| TransportError::ConnectionFailed(format!("WebSocket connect failed: {e}")))?;

        let remote_addr = match ws_stream.get_ref() {
            MaybeTlsStream::Plain(tcp) => tcp.peer_addr()?,
            #[allow(unreachable_patterns)]
            _ => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        };

        info!("WebSocket connected to {} ({})", url, remote_addr);

        Ok(Box::new(WebSocketClientConnection::new(ws_stream, remote_addr)))
    }
}

/// WebSocket connection for client-side connections.
struct WebSocketClientConnection {
    sink: Mutex<SplitSink<ClientStream, Message>>,
    stream: Mutex<SplitStream<ClientStream>>,
    remote_addr: SocketAddr,
    closed: CancellationToken,
}

impl WebSocketClientConnection {
    fn new(ws_stream: ClientStream, remote_addr: SocketAddr) -> Self {
        let (sink, stream) = ws_stream.split();
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            remote_addr,
            closed: CancellationToken::new(),
        }
    }
}

impl Debug for WebSocketClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketClientConnection")
            .field("remote_addr", &self.remote_addr)
            .field("closed", &self.closed.is_cancelled())
            .finish()
    }
}

#[async_trait]
impl Connection for WebSocketClientConnection {
    async fn send(&self, data: Bytes) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(TransportError::ConnectionClosed);
        }

        let text = text_frame(&data)?;
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Io(std::io::Error::other(e)))
    }

    async fn recv(&self) -> Result<Bytes> {
        let mut stream = self.stream.lock().await;
        loop {
            let next = tokio::select! {
                biased;
                () = self.closed.cancelled() => return Err(TransportError::ConnectionClosed),
                next = stream.next() => next,
            };

            match next {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Bytes::copy_from_slice(text.as_str().as_bytes()));
                }
                Some(Ok(Message::Binary(data))) => return Ok(data),
                Some(Ok(Message::Close(_))) | None => {
                    self.closed.cancel();
                    return Err(TransportError::ConnectionClosed);
                }
                // Control frames are answered by tungstenite itself
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(TransportError::Io(std::io::Error::other(e))),
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.cancel();
        let mut sink = self.sink.lock().await;
        let _ = sink.close().await;
        Ok(())
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

/// WebSocket connection for server-side connections (from Axum).
struct WebSocketServerConnection {
    sink: Mutex<SplitSink<WebSocket, ws::Message>>,
    stream: Mutex<SplitStream<WebSocket>>,
    remote_addr: SocketAddr,
    closed: CancellationToken,
}

impl WebSocketServerConnection {
    fn new(socket: WebSocket, remote_addr: SocketAddr) -> Self {
        let (sink, stream) = socket.split();
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            remote_addr,
            closed: CancellationToken::new(),
        }
    }
}

impl Debug for WebSocketServerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketServerConnection")
            .field("remote_addr", &self.remote_addr)
            .field("closed", &self.closed.is_cancelled())
            .finish()
    }
}

#[async_trait]
impl Connection for WebSocketServerConnection {
    async fn send(&self, data: Bytes) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(TransportError::ConnectionClosed);
        }

        let text = text_frame(&data)?;
        let mut sink = self.sink.lock().await;
        sink.send(ws::Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Io(std::io::Error::other(e.to_string())))
    }

    async fn recv(&self) -> Result<Bytes> {
        let mut stream = self.stream.lock().await;
        loop {
            let next = tokio::select! {
                biased;
                () = self.closed.cancelled() => return Err(TransportError::ConnectionClosed),
                next = stream.next() => next,
            };

            match next {
                Some(Ok(ws::Message::Text(text))) => {
                    return Ok(Bytes::copy_from_slice(text.as_str().as_bytes()));
                }
                Some(Ok(ws::Message::Binary(data))) => return Ok(data),
                Some(Ok(ws::Message::Close(_))) | None => {
                    self.closed.cancel();
                    return Err(TransportError::ConnectionClosed);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return Err(TransportError::Io(std::io::Error::other(e.to_string())));
                }
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.cancel();
        let mut sink = self.sink.lock().await;
        let _ = sink.close().await;
        Ok(())
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

/// WebSocket listener that receives connections from an Axum route.
///
/// The router returned by [`WebSocketListener::router`] extracts the peer
/// address, so the server must be run with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
#[derive(Debug, Clone)]
pub struct WebSocketListener {
    connection_rx: Arc<Mutex<mpsc::Receiver<Box<dyn Connection>>>>,
    connection_tx: mpsc::Sender<Box<dyn Connection>>,
}

impl WebSocketListener {
    /// Create a listener with no route mounted yet.
    #[must_use]
    pub fn new() -> Self {
        let (connection_tx, connection_rx) = mpsc::channel(ACCEPT_QUEUE_SIZE);
        Self {
            connection_rx: Arc::new(Mutex::new(connection_rx)),
            connection_tx,
        }
    }

    /// Build a router that upgrades requests on `path` and queues the
    /// resulting connections for [`Listener::accept`].
    pub fn router(&self, path: &str) -> Router {
        let connection_tx = self.connection_tx.clone();

        let handler = move |ConnectInfo(addr): ConnectInfo<SocketAddr>, ws: WebSocketUpgrade| {
            let connection_tx = connection_tx.clone();

            async move {
                ws.on_upgrade(move |socket| async move {
                    debug!("WebSocket upgraded for {}", addr);
                    let conn = WebSocketServerConnection::new(socket, addr);
                    if connection_tx.send(Box::new(conn)).await.is_err() {
                        error!("Listener for {} is gone, dropping connection", addr);
                    }
                })
            }
        };

        Router::new().route(path, get(handler))
    }
}

impl Default for WebSocketListener {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Listener for WebSocketListener {
    async fn accept(&self) -> Result<Box<dyn Connection>> {
        let mut rx = self.connection_rx.lock().await;
        rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }
}
