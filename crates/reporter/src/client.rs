//! The reporting loop and its supervisor.

use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use ethstats_protocol::{Frame, Hello, Latency, Message, NodeInfo, NodePing, NodeStatus};
use ethstats_transport::{Connection, Transport};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::chain::ChainClient;
use crate::error::{Error, Result};
use crate::probe::{ProcessHealth, ProcessProbe, is_loopback};
use crate::stats::collect_stats;

/// Time between reports.
pub const REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Delay after `hello` before a latency probe is sent instead of stats.
pub const LATENCY_DELAY: Duration = Duration::from_secs(2);

/// How long to wait for `node-pong`.
pub const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause before the supervisor reconnects after a failed run.
pub const RESTART_DELAY: Duration = Duration::from_secs(5);

/// Options for configuring a [`ReporterClient`].
#[derive(Clone, Debug)]
pub struct ReporterOptions {
    /// Node description; `node_info.id` is the login identity.
    pub node_info: NodeInfo,
    /// Shared relay secret.
    pub secret: String,
    /// Relay WebSocket URL.
    pub server_url: Url,
    /// Chain RPC URL. The process probe only runs when this is loopback.
    pub chain_url: Url,
    /// Time between reports.
    pub report_interval: Duration,
    /// Delay after `hello` before the latency probe wins the race.
    pub latency_delay: Duration,
    /// `node-pong` deadline.
    pub pong_timeout: Duration,
    /// Pause between failed runs.
    pub restart_delay: Duration,
}

impl ReporterOptions {
    /// Options with the default timings.
    #[must_use]
    pub const fn new(node_info: NodeInfo, secret: String, server_url: Url, chain_url: Url) -> Self {
        Self {
            node_info,
            secret,
            server_url,
            chain_url,
            report_interval: REPORT_INTERVAL,
            latency_delay: LATENCY_DELAY,
            pong_timeout: PONG_TIMEOUT,
            restart_delay: RESTART_DELAY,
        }
    }

    /// Check that the report interval is non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInterval`] if it is zero.
    pub fn validate(&self) -> Result<()> {
        if self.report_interval.is_zero() {
            return Err(Error::InvalidInterval("report_interval"));
        }
        Ok(())
    }
}

/// Pending rendezvous between the report loop and the reader task.
#[derive(Debug, Default)]
struct Waiters {
    ready: Option<oneshot::Sender<()>>,
    pong: Option<oneshot::Sender<()>>,
    closed: bool,
}

impl Waiters {
    fn register(slot: &mut Option<oneshot::Sender<()>>, closed: bool) -> Result<oneshot::Receiver<()>> {
        if closed {
            return Err(Error::ReaderStopped);
        }
        let (tx, rx) = oneshot::channel();
        *slot = Some(tx);
        Ok(rx)
    }

    fn ready(&mut self) -> Result<oneshot::Receiver<()>> {
        Self::register(&mut self.ready, self.closed)
    }

    fn pong(&mut self) -> Result<oneshot::Receiver<()>> {
        Self::register(&mut self.pong, self.closed)
    }

    fn close(&mut self) {
        self.closed = true;
        self.ready = None;
        self.pong = None;
    }
}

/// Reports one node's liveness and status to a relay.
#[derive(Debug)]
pub struct ReporterClient<T, C, P>
where
    T: Transport,
    C: ChainClient,
    P: ProcessProbe,
{
    options: ReporterOptions,
    transport: T,
    chain: C,
    probe: P,
    probe_enabled: bool,
}

impl<T, C, P> ReporterClient<T, C, P>
where
    T: Transport,
    C: ChainClient,
    P: ProcessProbe,
{
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInterval`] if `options.report_interval` is zero.
    pub fn new(options: ReporterOptions, transport: T, chain: C, probe: P) -> Result<Self> {
        options.validate()?;
        let probe_enabled = is_loopback(&options.chain_url);

        Ok(Self {
            options,
            transport,
            chain,
            probe,
            probe_enabled,
        })
    }

    /// Run until `shutdown` fires, restarting after every failed run.
    pub async fn start(&self, shutdown: CancellationToken) {
        loop {
            match self.run_once(&shutdown).await {
                Ok(()) => break,
                Err(e) => warn!("reporter run failed: {}", e),
            }

            info!("restarting in {:?}", self.options.restart_delay);
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = sleep(self.options.restart_delay) => {}
            }
        }

        info!("reporter stopped");
    }

    /// One connection's worth of reporting.
    ///
    /// Returns `Ok(())` only when `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns the first failure: dial error, send error, or the reason the
    /// reader task ended.
    pub async fn run_once(&self, shutdown: &CancellationToken) -> Result<()> {
        let connection: Arc<dyn Connection> = match self
            .transport
            .connect(&self.options.server_url)
            .await
        {
            Ok(connection) => Arc::from(connection),
            Err(e) => {
                error!("dial {} failed: {}", self.options.server_url, e);
                return Err(e.into());
            }
        };
        info!("connected to {}", self.options.server_url);

        let waiters = Arc::new(Mutex::new(Waiters::default()));
        let mut reader = tokio::spawn(read_loop(Arc::clone(&connection), Arc::clone(&waiters)));

        let mut ticker = interval(self.options.report_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break Ok(()),
                joined = &mut reader => break Err(reader_exit(joined)),
                _ = ticker.tick() => {
                    let outcome = tokio::select! {
                        () = shutdown.cancelled() => break Ok(()),
                        outcome = self.report(connection.as_ref(), &waiters) => outcome,
                    };

                    match outcome {
                        Ok(()) => {}
                        Err(Error::PongTimeout(deadline)) => {
                            warn!("no node-pong within {:?}", deadline);
                        }
                        Err(Error::ReaderStopped) => break Err(reader_exit((&mut reader).await)),
                        Err(e) => break Err(e),
                    }
                }
            }
        };

        reader.abort();
        let _ = connection.close().await;

        result
    }

    /// One report tick: log in, then either report stats or measure latency.
    async fn report(&self, connection: &dyn Connection, waiters: &Mutex<Waiters>) -> Result<()> {
        let ready = waiters.lock().ready()?;

        send(
            connection,
            &Message::Hello(Hello {
                id: self.options.node_info.id.clone(),
                secret: self.options.secret.clone(),
            }),
        )
        .await?;

        tokio::select! {
            ready = ready => {
                ready.map_err(|_| Error::ReaderStopped)?;
                self.report_stats(connection).await
            }
            () = sleep(self.options.latency_delay) => self.report_latency(connection, waiters).await,
        }
    }

    async fn report_stats(&self, connection: &dyn Connection) -> Result<()> {
        let stats = collect_stats(&self.chain, &self.options.node_info).await;

        trace!("sending stats for block {}", stats.block.number);
        send(connection, &Message::Stats(Box::new(stats))).await
    }

    async fn report_latency(
        &self,
        connection: &dyn Connection,
        waiters: &Mutex<Waiters>,
    ) -> Result<()> {
        let node_status = self.node_status().await;
        let pong = waiters.lock().pong()?;
        let start = Instant::now();

        send(
            connection,
            &Message::NodePing(NodePing {
                id: self.options.node_info.id.clone(),
                client_time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                node_status,
            }),
        )
        .await?;

        match timeout(self.options.pong_timeout, pong).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return Err(Error::ReaderStopped),
            Err(_) => return Err(Error::PongTimeout(self.options.pong_timeout)),
        }

        let latency = start.elapsed().as_millis();
        debug!("measured latency {} ms", latency);

        send(
            connection,
            &Message::Latency(Latency {
                id: self.options.node_info.id.clone(),
                latency: latency.to_string(),
            }),
        )
        .await
    }

    async fn node_status(&self) -> NodeStatus {
        if !self.probe_enabled {
            return NodeStatus::Running;
        }

        match self.probe.probe().await {
            ProcessHealth::Healthy => NodeStatus::Running,
            ProcessHealth::Unhealthy => NodeStatus::Stopped,
        }
    }
}

async fn send(connection: &dyn Connection, message: &Message) -> Result<()> {
    connection.send(message.encode()?).await?;
    Ok(())
}

/// Dispatch relay frames to the waiters until something ends the connection.
async fn read_loop(connection: Arc<dyn Connection>, waiters: Arc<Mutex<Waiters>>) -> Error {
    let reason = loop {
        let raw = match connection.recv().await {
            Ok(raw) => raw,
            Err(e) => break Error::Transport(e),
        };

        let message = match Frame::decode(&raw).and_then(|frame| frame.message()) {
            Ok(message) => message,
            Err(e) => break Error::Protocol(e),
        };

        match message {
            Message::Ready => {
                info!("login accepted");
                if let Some(ready) = waiters.lock().ready.take() {
                    let _ = ready.send(());
                }
            }
            Message::NodePong(_) => {
                if let Some(pong) = waiters.lock().pong.take() {
                    let _ = pong.send(());
                }
            }
            Message::Unauthorized(reason) => {
                warn!("login rejected: {}", reason);
                break Error::Unauthorized(reason);
            }
            other => break Error::UnexpectedMessage(other.message_type()),
        }
    };

    waiters.lock().close();
    reason
}

fn reader_exit(joined: std::result::Result<Error, tokio::task::JoinError>) -> Error {
    match joined {
        Ok(reason) => reason,
        Err(e) if e.is_panic() => Error::ReaderPanicked,
        Err(_) => Error::ReaderStopped,
    }
}
