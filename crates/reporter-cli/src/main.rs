//! CLI binary running the ethstats reporter next to a chain node.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::time::Duration;

use clap::Parser;
use ethstats_protocol::NodeInfo;
use ethstats_reporter::{
    CommandProbe, CommandProbeOptions, DEFAULT_PROBE_PATTERNS, ReporterClient, ReporterOptions,
    RpcChainClient, RpcChainClientOptions,
};
use ethstats_transport_ws::WebSocketTransport;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Reporter library error
    #[error(transparent)]
    Reporter(#[from] ethstats_reporter::Error),
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Node name, also used as the login id
    #[arg(long, env = "ETHSTATS_NAME")]
    name: String,

    /// Operator contact
    #[arg(long, default_value = "", env = "ETHSTATS_CONTACT")]
    contact: String,

    /// Reporter version tag sent with every report
    #[arg(long, default_value = "v1.0.0", env = "ETHSTATS_VERSION_TAG")]
    version_tag: String,

    /// Secret shared with the relay
    #[arg(long, env = "ETHSTATS_SECRET")]
    secret: String,

    /// Relay WebSocket URL, e.g. `ws://relay.example.org:3000/`
    #[arg(long, env = "ETHSTATS_SERVER_URL")]
    server_url: Url,

    /// Chain JSON-RPC URL
    #[arg(long, default_value = "http://127.0.0.1:8545", env = "ETHSTATS_CHAIN_URL")]
    chain_url: Url,

    /// P2P port of the chain client, reported as is
    #[arg(long, default_value = "30303", env = "ETHSTATS_CHAIN_PORT")]
    chain_port: String,

    /// Timeout for each chain RPC call, in seconds
    #[arg(long, default_value_t = 10, env = "ETHSTATS_CHAIN_TIMEOUT_SECS")]
    chain_timeout_secs: u64,

    /// Process list patterns that must all be present for the node to count as running
    #[arg(long = "probe-pattern", env = "ETHSTATS_PROBE_PATTERNS", value_delimiter = ',')]
    probe_patterns: Vec<String>,

    /// Log filter, e.g. `info` or `ethstats_reporter=debug`
    #[arg(long, default_value = "info", env = "ETHSTATS_LOG_LEVEL")]
    log_level: String,
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = sigint.recv() => info!("Received SIGINT"),
                }
                return;
            }
            _ => warn!("failed to install signal handlers, falling back to ctrl-c"),
        }
    }

    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received interrupt signal");
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let node_info = NodeInfo {
        id: args.name.clone(),
        name: args.name,
        contact: args.contact,
        chain_port: args.chain_port,
        os_platform: std::env::consts::ARCH.to_string(),
        os: std::env::consts::OS.to_string(),
        client: args.version_tag,
        ..NodeInfo::default()
    };

    let chain = RpcChainClient::new(RpcChainClientOptions {
        url: args.chain_url.clone(),
        timeout: Duration::from_secs(args.chain_timeout_secs),
    })?;

    let patterns = if args.probe_patterns.is_empty() {
        DEFAULT_PROBE_PATTERNS.iter().map(ToString::to_string).collect()
    } else {
        args.probe_patterns
    };
    let probe = CommandProbe::new(CommandProbeOptions { patterns });

    let client = ReporterClient::new(
        ReporterOptions::new(node_info, args.secret, args.server_url, args.chain_url),
        WebSocketTransport::new(),
        chain,
        probe,
    )?;

    let shutdown_token = CancellationToken::new();
    let signal_shutdown_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutting down");
        signal_shutdown_token.cancel();
    });

    client.start(shutdown_token).await;

    Ok(())
}
