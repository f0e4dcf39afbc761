//! Relay server for node liveness and status reports.
//!
//! Reporters connect on [`NODE_PATH`] and run a [`NodeSession`] each.
//! Dashboards subscribe on [`DASHBOARD_PATH`] and receive every relayed
//! frame. Shared state lives in the [`Hub`] task.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod hub;
mod session;

pub use error::{Error, Result};
pub use hub::{
    BROADCAST_INTERVAL, Hub, HubHandle, HubOptions, HubStats, MONITOR_INTERVAL, NodeSnapshot,
};
pub use session::{MAX_PING_FAILURES, NodeSession, SessionState};

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use ethstats_alerts::Mailer;
use ethstats_transport::Listener;
use ethstats_transport_ws::WebSocketListener;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

/// Path reporters connect to.
pub const NODE_PATH: &str = "/";

/// Path dashboards subscribe on.
pub const DASHBOARD_PATH: &str = "/api";

/// Path of the health endpoint.
pub const HEALTH_PATH: &str = "/health";

/// Options for configuring a [`Relay`].
#[derive(Clone, Debug)]
pub struct RelayOptions {
    /// Address to listen on. Port 0 picks a free port.
    pub listen_addr: SocketAddr,
    /// Shared secret every reporter must present.
    pub secret: String,
    /// Hub timing.
    pub hub: HubOptions,
}

/// The relay server.
#[derive(Debug)]
pub struct Relay<M: Mailer> {
    options: RelayOptions,
    mailer: Arc<M>,
    shutdown_token: CancellationToken,
    task_tracker: TaskTracker,
}

impl<M: Mailer> Relay<M> {
    /// Create a relay that delivers alerts through `mailer`.
    pub fn new(options: RelayOptions, mailer: M) -> Self {
        Self {
            options,
            mailer: Arc::new(mailer),
            shutdown_token: CancellationToken::new(),
            task_tracker: TaskTracker::new(),
        }
    }

    /// Bind the listen socket and start serving.
    ///
    /// Returns the bound address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyStarted`] on a second call and
    /// [`Error::Bind`] if the socket cannot be bound. Zero hub periods are
    /// rejected with [`Error::InvalidInterval`] before anything is bound.
    pub async fn start(&self) -> Result<SocketAddr> {
        if self.task_tracker.is_closed() {
            return Err(Error::AlreadyStarted);
        }

        self.options.hub.validate()?;

        let listener = TcpListener::bind(self.options.listen_addr)
            .await
            .map_err(Error::Bind)?;
        let local_addr = listener.local_addr().map_err(Error::Bind)?;

        let (hub, hub_task) = Hub::spawn(
            self.options.hub.clone(),
            Arc::clone(&self.mailer),
            self.shutdown_token.clone(),
        )?;
        self.task_tracker.spawn(async move {
            if let Err(e) = hub_task.await {
                error!("hub task failed: {}", e);
            }
        });

        let nodes = WebSocketListener::new();
        let dashboards = WebSocketListener::new();

        let router = Router::new()
            .merge(nodes.router(NODE_PATH))
            .merge(dashboards.router(DASHBOARD_PATH))
            .merge(
                Router::new()
                    .route(HEALTH_PATH, get(health))
                    .with_state(hub.clone()),
            );

        let shutdown_token = self.shutdown_token.clone();
        self.task_tracker.spawn(async move {
            tokio::select! {
                e = axum::serve(
                    listener,
                    router.into_make_service_with_connect_info::<SocketAddr>(),
                ).into_future() => {
                    info!("relay server exited {:?}", e);
                }
                () = shutdown_token.cancelled() => {}
            }
        });

        let secret: Arc<str> = Arc::from(self.options.secret.as_str());
        self.task_tracker.spawn(accept_nodes(
            nodes,
            secret,
            hub.clone(),
            self.task_tracker.clone(),
            self.shutdown_token.clone(),
        ));
        self.task_tracker
            .spawn(accept_dashboards(dashboards, hub, self.shutdown_token.clone()));

        self.task_tracker.close();

        info!("relay listening on {}", local_addr);

        Ok(local_addr)
    }

    /// Stop serving, close every connection and wait for all tasks.
    pub async fn shutdown(&self) {
        info!("relay shutting down...");

        self.shutdown_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("relay shutdown");
    }
}

async fn accept_nodes(
    listener: WebSocketListener,
    secret: Arc<str>,
    hub: HubHandle,
    task_tracker: TaskTracker,
    shutdown_token: CancellationToken,
) {
    loop {
        let connection = tokio::select! {
            () = shutdown_token.cancelled() => break,
            connection = listener.accept() => connection,
        };

        match connection {
            Ok(connection) => {
                let session = NodeSession::new(connection, Arc::clone(&secret), hub.clone());
                task_tracker.spawn(session.run(shutdown_token.clone()));
            }
            Err(e) => {
                error!("node listener stopped: {}", e);
                break;
            }
        }
    }
}

async fn accept_dashboards(
    listener: WebSocketListener,
    hub: HubHandle,
    shutdown_token: CancellationToken,
) {
    loop {
        let connection = tokio::select! {
            () = shutdown_token.cancelled() => break,
            connection = listener.accept() => connection,
        };

        match connection {
            Ok(connection) => {
                if hub.subscribe(connection).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                error!("dashboard listener stopped: {}", e);
                break;
            }
        }
    }
}

async fn health(State(hub): State<HubHandle>) -> std::result::Result<Json<HubStats>, StatusCode> {
    hub.stats()
        .await
        .map(Json)
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)
}
