//! Single-owner aggregation and fan-out.
//!
//! The [`Hub`] task is the only code that touches the node snapshots, the
//! identity bindings and the dashboard subscribers. Sessions and the HTTP
//! layer reach it through a cloneable [`HubHandle`]; requests that need an
//! answer carry a oneshot reply channel.
//!
//! Each dashboard gets its own writer task fed by a bounded queue, so a
//! dashboard that stops reading never holds up the hub loop. A dashboard whose
//! queue is full, or whose writer gave up, is dropped.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use ethstats_alerts::{
    Alert, AlertDeduplicator, DEFAULT_ALERT_WINDOW, FailureKind, Mailer, timestamp,
};
use ethstats_protocol::Stats;
use ethstats_transport::Connection;
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at, timeout, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

/// How often stored snapshots are pushed to every dashboard.
pub const BROADCAST_INTERVAL: Duration = Duration::from_secs(15);

/// How often the digest goes out.
pub const MONITOR_INTERVAL: Duration = Duration::from_secs(86_400);

/// A dashboard that does not take a frame within this long is dropped.
const SUBSCRIBER_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Frames queued per dashboard before it counts as stalled.
const SUBSCRIBER_QUEUE_SIZE: usize = 256;

const COMMAND_QUEUE_SIZE: usize = 1024;

/// Options for configuring a [`Hub`].
#[derive(Clone, Debug)]
pub struct HubOptions {
    /// Snapshot rebroadcast period.
    pub broadcast_interval: Duration,
    /// Digest period.
    pub monitor_interval: Duration,
    /// Suppression window for repeated failure alerts.
    pub alert_window: Duration,
}

impl HubOptions {
    /// Check that both ticker periods are non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInterval`] naming the first zero period.
    pub fn validate(&self) -> Result<()> {
        if self.broadcast_interval.is_zero() {
            return Err(Error::InvalidInterval("broadcast_interval"));
        }
        if self.monitor_interval.is_zero() {
            return Err(Error::InvalidInterval("monitor_interval"));
        }
        Ok(())
    }
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            broadcast_interval: BROADCAST_INTERVAL,
            monitor_interval: MONITOR_INTERVAL,
            alert_window: DEFAULT_ALERT_WINDOW,
        }
    }
}

/// Latest status report of one node session.
#[derive(Clone, Debug)]
pub struct NodeSnapshot {
    /// Login identity of the reporting session.
    pub node_id: String,
    /// The `stats` frame exactly as received, relayed verbatim.
    pub raw: Bytes,
    /// Decoded report, used for the digest. `None` if the payload did not decode.
    pub stats: Option<Stats>,
}

/// Counters exposed by [`HubHandle::stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Sessions with a stored snapshot.
    pub nodes: usize,
    /// Bound login identities.
    pub identities: usize,
    /// Connected dashboards.
    pub subscribers: usize,
}

#[derive(Debug)]
enum Command {
    Subscribe(Box<dyn Connection>),
    Ping(Bytes),
    Latency(Bytes),
    Snapshot {
        addr: SocketAddr,
        snapshot: NodeSnapshot,
    },
    Bind {
        node_id: String,
        addr: SocketAddr,
        reply: oneshot::Sender<bool>,
    },
    SessionClosed {
        addr: SocketAddr,
        node_id: Option<String>,
        failure: Option<FailureKind>,
    },
    Stats(oneshot::Sender<HubStats>),
}

/// Cloneable handle for talking to a running [`Hub`].
#[derive(Clone, Debug)]
pub struct HubHandle {
    commands: mpsc::Sender<Command>,
}

impl HubHandle {
    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::HubClosed)
    }

    /// Register a dashboard connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HubClosed`] if the hub has shut down.
    pub async fn subscribe(&self, connection: Box<dyn Connection>) -> Result<()> {
        self.send(Command::Subscribe(connection)).await
    }

    /// Relay a `node-ping` frame to every dashboard.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HubClosed`] if the hub has shut down.
    pub async fn forward_ping(&self, frame: Bytes) -> Result<()> {
        self.send(Command::Ping(frame)).await
    }

    /// Relay a `latency` frame to every dashboard.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HubClosed`] if the hub has shut down.
    pub async fn forward_latency(&self, frame: Bytes) -> Result<()> {
        self.send(Command::Latency(frame)).await
    }

    /// Store the latest snapshot for the session at `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HubClosed`] if the hub has shut down.
    pub async fn update_snapshot(&self, addr: SocketAddr, snapshot: NodeSnapshot) -> Result<()> {
        self.send(Command::Snapshot { addr, snapshot }).await
    }

    /// Bind `node_id` to the session at `addr`.
    ///
    /// Returns `false` if the id is already bound to a different session. A
    /// session re-binding its own id succeeds; binding a new id releases the
    /// session's previous one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HubClosed`] if the hub has shut down.
    pub async fn bind(&self, node_id: &str, addr: SocketAddr) -> Result<bool> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Bind {
            node_id: node_id.to_string(),
            addr,
            reply,
        })
        .await?;
        response.await.map_err(|_| Error::HubClosed)
    }

    /// Release everything held for the session at `addr`.
    ///
    /// Removes its snapshot, alerts on `failure` if `node_id` was bound, then
    /// unbinds `node_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HubClosed`] if the hub has shut down.
    pub async fn session_closed(
        &self,
        addr: SocketAddr,
        node_id: Option<String>,
        failure: Option<FailureKind>,
    ) -> Result<()> {
        self.send(Command::SessionClosed {
            addr,
            node_id,
            failure,
        })
        .await
    }

    /// Current counters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HubClosed`] if the hub has shut down.
    pub async fn stats(&self) -> Result<HubStats> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Stats(reply)).await?;
        response.await.map_err(|_| Error::HubClosed)
    }
}

/// A registered dashboard and the task writing to it.
struct Subscriber {
    remote_addr: SocketAddr,
    frames: mpsc::Sender<Bytes>,
    writer: JoinHandle<()>,
}

impl Subscriber {
    fn spawn(connection: Box<dyn Connection>) -> Self {
        let remote_addr = connection.remote_addr();
        let (frames, mut queue) = mpsc::channel::<Bytes>(SUBSCRIBER_QUEUE_SIZE);

        let writer = tokio::spawn(async move {
            while let Some(frame) = queue.recv().await {
                match timeout(SUBSCRIBER_SEND_TIMEOUT, connection.send(frame)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!("write to dashboard {} failed: {}", remote_addr, e);
                        break;
                    }
                    Err(_) => {
                        debug!("write to dashboard {} timed out", remote_addr);
                        break;
                    }
                }
            }

            let _ = connection.close().await;
            info!("closed connection with dashboard {}", remote_addr);
        });

        Self {
            remote_addr,
            frames,
            writer,
        }
    }

    fn is_alive(&self) -> bool {
        !self.frames.is_closed()
    }
}

/// Owner of node snapshots, identity bindings and dashboard subscribers.
pub struct Hub<M: Mailer> {
    options: HubOptions,
    mailer: Arc<M>,
    dedup: AlertDeduplicator,
    snapshots: HashMap<SocketAddr, NodeSnapshot>,
    bindings: HashMap<String, SocketAddr>,
    subscribers: Vec<Subscriber>,
}

impl<M: Mailer> Hub<M> {
    /// Spawn the hub task.
    ///
    /// The task runs until `shutdown` is cancelled, then closes every
    /// dashboard and stops accepting requests.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInterval`] if a ticker period is zero.
    pub fn spawn(
        options: HubOptions,
        mailer: Arc<M>,
        shutdown: CancellationToken,
    ) -> Result<(HubHandle, JoinHandle<()>)> {
        options.validate()?;

        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_SIZE);

        let hub = Self {
            dedup: AlertDeduplicator::new(options.alert_window),
            options,
            mailer,
            snapshots: HashMap::new(),
            bindings: HashMap::new(),
            subscribers: Vec::new(),
        };

        let task = tokio::spawn(hub.run(commands_rx, shutdown));

        Ok((
            HubHandle {
                commands: commands_tx,
            },
            task,
        ))
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>, shutdown: CancellationToken) {
        let start = Instant::now();
        let mut broadcast_ticker = interval_at(
            start + self.options.broadcast_interval,
            self.options.broadcast_interval,
        );
        let mut monitor_ticker = interval_at(
            start + self.options.monitor_interval,
            self.options.monitor_interval,
        );

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                _ = broadcast_ticker.tick() => self.broadcast_snapshots(),
                _ = monitor_ticker.tick() => self.send_digest(),
            }
        }

        self.quit(commands).await;
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Subscribe(connection) => {
                info!("connected new dashboard ({})", connection.remote_addr());
                self.subscribers.push(Subscriber::spawn(connection));
            }
            Command::Ping(frame) | Command::Latency(frame) => self.broadcast(&frame),
            Command::Snapshot { addr, snapshot } => {
                self.snapshots.insert(addr, snapshot);
                debug!("currently there are {} reporting nodes", self.snapshots.len());
            }
            Command::Bind {
                node_id,
                addr,
                reply,
            } => {
                let _ = reply.send(self.bind(node_id, addr));
            }
            Command::SessionClosed {
                addr,
                node_id,
                failure,
            } => self.release(addr, node_id, failure),
            Command::Stats(reply) => {
                self.subscribers.retain(Subscriber::is_alive);
                let _ = reply.send(HubStats {
                    nodes: self.snapshots.len(),
                    identities: self.bindings.len(),
                    subscribers: self.subscribers.len(),
                });
            }
        }
    }

    fn bind(&mut self, node_id: String, addr: SocketAddr) -> bool {
        match self.bindings.get(&node_id) {
            Some(bound) if *bound != addr => return false,
            Some(_) => return true,
            None => {}
        }

        self.bindings.retain(|_, bound| *bound != addr);
        self.bindings.insert(node_id, addr);
        true
    }

    fn release(&mut self, addr: SocketAddr, node_id: Option<String>, failure: Option<FailureKind>) {
        self.snapshots.remove(&addr);

        if let Some(node_id) = node_id {
            if let Some(kind) = failure {
                self.alert(Alert {
                    node_id: node_id.clone(),
                    kind,
                    remote_addr: addr,
                });
            }

            if self.bindings.get(&node_id) == Some(&addr) {
                self.bindings.remove(&node_id);
            }
        }

        info!(
            "released session {}, there are {} reporting nodes",
            addr,
            self.snapshots.len()
        );
    }

    fn alert(&mut self, alert: Alert) {
        if !self.dedup.should_send(&alert.node_id, alert.kind) {
            debug!(
                node_id = %alert.node_id,
                kind = %alert.kind,
                "alert suppressed within window"
            );
            return;
        }

        let mailer = Arc::clone(&self.mailer);
        tokio::spawn(async move {
            match mailer.send_alert(&alert.subject(), &alert.body()).await {
                Ok(()) => info!(node_id = %alert.node_id, kind = %alert.kind, "alert sent"),
                Err(e) => error!(
                    node_id = %alert.node_id,
                    kind = %alert.kind,
                    "alert delivery failed: {}",
                    e
                ),
            }
        });
    }

    /// Queue `frame` for every dashboard, dropping any that failed or stalled.
    fn broadcast(&mut self, frame: &Bytes) {
        self.subscribers
            .retain(|subscriber| match subscriber.frames.try_send(frame.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!("dashboard {} is not keeping up, dropping it", subscriber.remote_addr);
                    subscriber.writer.abort();
                    false
                }
                Err(TrySendError::Closed(_)) => false,
            });
    }

    fn broadcast_snapshots(&mut self) {
        if self.subscribers.is_empty() {
            return;
        }

        let frames: Vec<Bytes> = self
            .snapshots
            .values()
            .map(|snapshot| snapshot.raw.clone())
            .collect();

        for frame in &frames {
            self.broadcast(frame);
        }
    }

    fn digest(&self) -> String {
        let mut nodes: Vec<(&str, Option<u64>)> = self
            .snapshots
            .values()
            .map(|snapshot| {
                (
                    snapshot.node_id.as_str(),
                    snapshot.stats.as_ref().map(|stats| stats.block.number),
                )
            })
            .collect();
        nodes.sort_unstable();

        let mut body = format!(
            "node count: {}\nblock height per node:\n",
            self.snapshots.len()
        );
        for (node_id, height) in nodes {
            let _ = match height {
                Some(height) => writeln!(body, "-- node id: {node_id}, block height: {height}"),
                None => writeln!(body, "-- node id: {node_id}, block height: unknown"),
            };
        }
        body
    }

    fn send_digest(&self) {
        let subject = format!("{}-node monitor digest", timestamp());
        let body = self.digest();
        info!("sending digest for {} nodes", self.snapshots.len());

        let mailer = Arc::clone(&self.mailer);
        tokio::spawn(async move {
            if let Err(e) = mailer.send_alert(&subject, &body).await {
                error!("digest delivery failed: {}", e);
            }
        });
    }

    async fn quit(&mut self, mut commands: mpsc::Receiver<Command>) {
        info!("closing all registered dashboards");

        commands.close();
        while let Ok(command) = commands.try_recv() {
            if let Command::Subscribe(connection) = command {
                let _ = connection.close().await;
            }
        }

        // Dropping the queues lets every writer flush and close at once
        let writers: Vec<JoinHandle<()>> = self
            .subscribers
            .drain(..)
            .map(|subscriber| subscriber.writer)
            .collect();

        let deadline = Instant::now() + SUBSCRIBER_SEND_TIMEOUT;
        for mut writer in writers {
            if timeout_at(deadline, &mut writer).await.is_err() {
                writer.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethstats_alerts_mock::RecordingMailer;
    use ethstats_protocol::{Block, Message, NodeInfo};
    use ethstats_transport::TransportError;
    use ethstats_transport_memory::MemoryConnection;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 1], port))
    }

    fn snapshot(node_id: &str, height: u64) -> NodeSnapshot {
        let stats = Stats {
            node_info: NodeInfo {
                id: node_id.to_string(),
                ..NodeInfo::default()
            },
            block: Block {
                number: height,
                ..Block::default()
            },
            ..Stats::default()
        };
        let raw = Message::Stats(Box::new(stats.clone())).encode().unwrap();
        NodeSnapshot {
            node_id: node_id.to_string(),
            raw,
            stats: Some(stats),
        }
    }

    fn spawn_hub(options: HubOptions) -> (HubHandle, RecordingMailer, CancellationToken) {
        let mailer = RecordingMailer::new();
        let shutdown = CancellationToken::new();
        let (hub, _task) = Hub::spawn(options, Arc::new(mailer.clone()), shutdown.clone()).unwrap();
        (hub, mailer, shutdown)
    }

    async fn wait_for_subscribers(hub: &HubHandle, count: usize) {
        for _ in 0..100 {
            if hub.stats().await.unwrap().subscribers == count {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("subscriber count never reached {count}");
    }

    async fn dashboard(hub: &HubHandle) -> MemoryConnection {
        let (relay_end, dashboard_end) = MemoryConnection::pair();
        hub.subscribe(Box::new(relay_end)).await.unwrap();
        dashboard_end
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_is_relayed_verbatim() {
        let (hub, _mailer, _shutdown) = spawn_hub(HubOptions::default());
        let first = dashboard(&hub).await;
        let second = dashboard(&hub).await;

        let frame = Bytes::from_static(
            br#"{"emit":["node-ping",{"id":"n1","clientTime":"t0","nodeStatus":"running"}]}"#,
        );
        hub.forward_ping(frame.clone()).await.unwrap();

        assert_eq!(first.recv().await.unwrap(), frame);
        assert_eq!(second.recv().await.unwrap(), frame);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshots_rebroadcast_on_tick() {
        let (hub, _mailer, _shutdown) = spawn_hub(HubOptions::default());
        let dash = dashboard(&hub).await;

        let node = snapshot("n1", 42);
        hub.update_snapshot(addr(1), node.clone()).await.unwrap();
        assert_eq!(hub.stats().await.unwrap().nodes, 1);

        let received = timeout(BROADCAST_INTERVAL + Duration::from_secs(1), dash.recv())
            .await
            .expect("no snapshot broadcast")
            .unwrap();
        assert_eq!(received, node.raw);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_subscriber_is_dropped() {
        let (hub, _mailer, _shutdown) = spawn_hub(HubOptions::default());
        let alive = dashboard(&hub).await;
        let gone = dashboard(&hub).await;
        drop(gone);

        hub.forward_latency(Bytes::from_static(br#"{"emit":["latency",{"id":"n1","latency":"3"}]}"#))
            .await
            .unwrap();

        assert!(alive.recv().await.is_ok());
        wait_for_subscribers(&hub, 1).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_dashboard_does_not_block_logins() {
        let (hub, _mailer, _shutdown) = spawn_hub(HubOptions::default());

        // Never read, so its transport buffer fills and its writer blocks
        let stalled = dashboard(&hub).await;
        let frame = Bytes::from_static(br#"{"emit":["latency",{"id":"n1","latency":"3"}]}"#);
        for _ in 0..150 {
            hub.forward_latency(frame.clone()).await.unwrap();
        }

        let bound = timeout(Duration::from_millis(10), hub.bind("n1", addr(1)))
            .await
            .expect("bind waited behind a stalled dashboard")
            .unwrap();
        assert!(bound);

        // The blocked write times out and the dashboard is dropped
        tokio::time::sleep(SUBSCRIBER_SEND_TIMEOUT + Duration::from_secs(1)).await;
        wait_for_subscribers(&hub, 0).await;
        drop(stalled);
    }

    #[tokio::test]
    async fn test_zero_interval_is_rejected() {
        let shutdown = CancellationToken::new();

        for options in [
            HubOptions {
                broadcast_interval: Duration::ZERO,
                ..HubOptions::default()
            },
            HubOptions {
                monitor_interval: Duration::ZERO,
                ..HubOptions::default()
            },
        ] {
            let result = Hub::spawn(options, Arc::new(RecordingMailer::new()), shutdown.clone());
            assert!(matches!(result, Err(Error::InvalidInterval(_))));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_bind_rejects_id_held_elsewhere() {
        let (hub, _mailer, _shutdown) = spawn_hub(HubOptions::default());

        assert!(hub.bind("n1", addr(1)).await.unwrap());
        assert!(hub.bind("n1", addr(1)).await.unwrap());
        assert!(!hub.bind("n1", addr(2)).await.unwrap());

        // Rejected session closing leaves the holder's binding alone
        hub.session_closed(addr(2), None, Some(FailureKind::AuthLoginSameNodeIdError))
            .await
            .unwrap();
        assert!(!hub.bind("n1", addr(2)).await.unwrap());

        hub.session_closed(addr(1), Some("n1".to_string()), Some(FailureKind::ConnectError))
            .await
            .unwrap();
        assert!(hub.bind("n1", addr(2)).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rebinding_new_id_releases_old_one() {
        let (hub, _mailer, _shutdown) = spawn_hub(HubOptions::default());

        assert!(hub.bind("n1", addr(1)).await.unwrap());
        assert!(hub.bind("n2", addr(1)).await.unwrap());
        assert!(hub.bind("n1", addr(2)).await.unwrap());
        assert_eq!(hub.stats().await.unwrap().identities, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_close_removes_snapshot_and_alerts_once_per_window() {
        let (hub, mailer, _shutdown) = spawn_hub(HubOptions::default());

        for _ in 0..2 {
            hub.bind("n1", addr(1)).await.unwrap();
            hub.update_snapshot(addr(1), snapshot("n1", 7)).await.unwrap();
            hub.session_closed(addr(1), Some("n1".to_string()), Some(FailureKind::PingStopError))
                .await
                .unwrap();
        }

        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.nodes, 0);
        assert_eq!(stats.identities, 0);

        mailer.wait_for(1).await;
        tokio::task::yield_now().await;
        assert_eq!(mailer.count(), 1);
        assert!(mailer.sent()[0].body.contains("[n1-10.0.0.1:1] process stopped"));

        tokio::time::advance(DEFAULT_ALERT_WINDOW + Duration::from_secs(1)).await;
        hub.bind("n1", addr(1)).await.unwrap();
        hub.session_closed(addr(1), Some("n1".to_string()), Some(FailureKind::PingStopError))
            .await
            .unwrap();
        mailer.wait_for(2).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthenticated_close_never_alerts() {
        let (hub, mailer, _shutdown) = spawn_hub(HubOptions::default());

        hub.session_closed(addr(1), None, Some(FailureKind::AuthLoginSecretError))
            .await
            .unwrap();
        hub.stats().await.unwrap();
        tokio::task::yield_now().await;

        assert_eq!(mailer.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_digest_lists_nodes_by_height() {
        let options = HubOptions {
            monitor_interval: Duration::from_secs(60),
            ..HubOptions::default()
        };
        let (hub, mailer, _shutdown) = spawn_hub(options);

        hub.update_snapshot(addr(1), snapshot("beta", 200)).await.unwrap();
        hub.update_snapshot(addr(2), snapshot("alpha", 100)).await.unwrap();
        hub.update_snapshot(
            addr(3),
            NodeSnapshot {
                node_id: "gamma".to_string(),
                raw: Bytes::from_static(br#"{"emit":["stats",{"Block":null}]}"#),
                stats: None,
            },
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;
        mailer.wait_for(1).await;

        let digest = &mailer.sent()[0];
        assert!(digest.subject.ends_with("-node monitor digest"));
        assert_eq!(
            digest.body,
            "node count: 3\nblock height per node:\n\
             -- node id: alpha, block height: 100\n\
             -- node id: beta, block height: 200\n\
             -- node id: gamma, block height: unknown\n"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_dashboards() {
        let (hub, _mailer, shutdown) = spawn_hub(HubOptions::default());
        let dash = dashboard(&hub).await;
        hub.stats().await.unwrap();

        shutdown.cancel();

        assert!(matches!(dash.recv().await, Err(TransportError::ConnectionClosed)));
        assert!(matches!(hub.stats().await, Err(Error::HubClosed)));
    }
}
