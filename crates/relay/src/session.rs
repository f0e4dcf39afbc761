//! Per-connection node session.
//!
//! A session reads frames from one reporter until the connection ends or it
//! decides to close it. Authentication happens on `hello`; everything except
//! `hello` sent before that is ignored. The session never touches shared
//! state directly, it asks the hub.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use ethstats_alerts::FailureKind;
use ethstats_protocol::{Frame, Hello, Message, MessageType, NodePing, NodeStatus, Stats};
use ethstats_transport::Connection;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::hub::{HubHandle, NodeSnapshot};

/// Consecutive undecodable `node-ping` payloads tolerated before closing.
pub const MAX_PING_FAILURES: u32 = 100;

const LOGIN_PARSE_ERROR: &str = "login data parsing error";
const LOGIN_SECRET_ERROR: &str = "login secret error";
const LOGIN_SAME_ID_ERROR: &str = "login same node id error";

/// Lifecycle of a [`NodeSession`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no successful `hello` yet.
    Connected,
    /// A `hello` was accepted.
    Authenticated,
    /// Released.
    Closed,
}

/// Why the read loop stopped.
#[derive(Debug)]
enum Close {
    Failure(FailureKind),
    Shutdown,
}

impl From<Error> for Close {
    fn from(_: Error) -> Self {
        Self::Shutdown
    }
}

type Flow = std::result::Result<(), Close>;

/// One reporter connection.
#[derive(Debug)]
pub struct NodeSession {
    connection: Box<dyn Connection>,
    secret: Arc<str>,
    hub: HubHandle,
    state: SessionState,
    login_id: Option<String>,
    ping_failures: u32,
}

impl NodeSession {
    /// Create a session for an accepted connection.
    #[must_use]
    pub fn new(connection: Box<dyn Connection>, secret: Arc<str>, hub: HubHandle) -> Self {
        Self {
            connection,
            secret,
            hub,
            state: SessionState::Connected,
            login_id: None,
            ping_failures: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    fn remote_addr(&self) -> SocketAddr {
        self.connection.remote_addr()
    }

    /// Serve the connection until it ends, the session rejects it, or
    /// `shutdown` fires. Always releases the session in the hub.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("node {} connected", self.remote_addr());

        let close = loop {
            let frame = tokio::select! {
                () = shutdown.cancelled() => break Close::Shutdown,
                frame = self.connection.recv() => frame,
            };

            let flow = match frame {
                Ok(frame) => self.handle_frame(frame).await,
                Err(e) => {
                    debug!("read from {} failed: {}", self.remote_addr(), e);
                    Err(Close::Failure(FailureKind::ConnectError))
                }
            };

            if let Err(close) = flow {
                break close;
            }
        };

        self.close(close).await;
    }

    async fn handle_frame(&mut self, raw: Bytes) -> Flow {
        let frame = match Frame::decode(&raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("undecodable frame from {}: {}", self.remote_addr(), e);
                return Err(Close::Failure(FailureKind::ConnectTypeError));
            }
        };

        match frame.message_type() {
            MessageType::Hello => self.handle_hello(&frame).await,
            MessageType::Ready | MessageType::Unauthorized | MessageType::NodePong => {
                warn!(
                    "unexpected {} frame from node {}",
                    frame.message_type(),
                    self.remote_addr()
                );
                Err(Close::Failure(FailureKind::ConnectTypeError))
            }
            other if self.state != SessionState::Authenticated => {
                debug!(
                    "dropping {} from unauthenticated node {}",
                    other,
                    self.remote_addr()
                );
                Ok(())
            }
            MessageType::NodePing => self.handle_ping(&frame, raw).await,
            MessageType::Latency => Ok(self.hub.forward_latency(raw).await?),
            MessageType::Stats => self.handle_stats(&frame, raw).await,
        }
    }

    async fn handle_hello(&mut self, frame: &Frame) -> Flow {
        let hello: Hello = match frame.payload() {
            Ok(hello) => hello,
            Err(e) => {
                debug!("bad login from {}: {}", self.remote_addr(), e);
                return Err(self.reject(FailureKind::AuthParseError, LOGIN_PARSE_ERROR).await);
            }
        };

        if hello.secret != *self.secret {
            warn!("node {} sent a wrong secret", self.remote_addr());
            return Err(self.reject(FailureKind::AuthLoginSecretError, LOGIN_SECRET_ERROR).await);
        }

        if !self.hub.bind(&hello.id, self.remote_addr()).await? {
            warn!(
                "node id {} is already logged in, rejecting {}",
                hello.id,
                self.remote_addr()
            );
            return Err(self
                .reject(FailureKind::AuthLoginSameNodeIdError, LOGIN_SAME_ID_ERROR)
                .await);
        }

        self.login_id = Some(hello.id);
        self.state = SessionState::Authenticated;

        if let Err(e) = self.send(&Message::Ready).await {
            warn!("failed to send ready to {}: {}", self.remote_addr(), e);
            return Err(Close::Failure(FailureKind::AuthLoginRespError));
        }

        Ok(())
    }

    /// Tell the node why it is being rejected and pick the failure to report.
    async fn reject(&self, kind: FailureKind, reason: &str) -> Close {
        match self.send(&Message::Unauthorized(reason.to_string())).await {
            Ok(()) => Close::Failure(kind),
            Err(e) => {
                debug!("failed to send un-authorization to {}: {}", self.remote_addr(), e);
                Close::Failure(FailureKind::AuthLoginRespError)
            }
        }
    }

    async fn handle_ping(&mut self, frame: &Frame, raw: Bytes) -> Flow {
        let ping: NodePing = match frame.payload() {
            Ok(ping) => ping,
            Err(e) => {
                self.ping_failures += 1;
                debug!(
                    "bad node-ping from {} ({} in a row): {}",
                    self.remote_addr(),
                    self.ping_failures,
                    e
                );
                if self.ping_failures >= MAX_PING_FAILURES {
                    return Err(Close::Failure(FailureKind::PingError));
                }
                return Ok(());
            }
        };
        self.ping_failures = 0;

        if ping.node_status == NodeStatus::Stopped {
            warn!("node {} reports its processes stopped", ping.id);
            return Err(Close::Failure(FailureKind::PingStopError));
        }

        if let Err(e) = self.send(&Message::NodePong(ping.id)).await {
            warn!("failed to send node-pong to {}: {}", self.remote_addr(), e);
        }

        Ok(self.hub.forward_ping(raw).await?)
    }

    /// Store the frame as the session's snapshot. The raw frame is kept even
    /// when its payload does not decode, so dashboards always see the latest.
    async fn handle_stats(&self, frame: &Frame, raw: Bytes) -> Flow {
        let stats = match frame.payload::<Stats>() {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!("undecodable stats from {}: {}", self.remote_addr(), e);
                None
            }
        };

        let snapshot = NodeSnapshot {
            node_id: self.login_id.clone().unwrap_or_default(),
            raw,
            stats,
        };
        self.hub.update_snapshot(self.remote_addr(), snapshot).await?;
        Ok(())
    }

    async fn send(&self, message: &Message) -> ethstats_transport::Result<()> {
        let frame = message
            .encode()
            .map_err(|e| ethstats_transport::TransportError::InvalidFrame(e.to_string()))?;
        self.connection.send(frame).await
    }

    async fn close(&mut self, close: Close) {
        let failure = match close {
            Close::Failure(kind) => Some(kind),
            Close::Shutdown => None,
        };

        if let Err(e) = self
            .hub
            .session_closed(self.remote_addr(), self.login_id.take(), failure)
            .await
        {
            debug!("could not release {}: {}", self.remote_addr(), e);
        }

        let _ = self.connection.close().await;
        self.state = SessionState::Closed;

        match failure {
            Some(kind) => info!("closed node {} ({})", self.remote_addr(), kind),
            None => info!("closed node {}", self.remote_addr()),
        }
    }
}
