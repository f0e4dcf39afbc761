//! CLI binary running the ethstats relay.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::Parser;
use ethstats_alerts::TracingMailer;
use ethstats_relay::{HubOptions, Relay, RelayOptions};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Relay library error
    #[error(transparent)]
    Relay(#[from] ethstats_relay::Error),

    /// Signal handler setup failed
    #[error("signal handler error: {0}")]
    Signal(#[from] std::io::Error),
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0", env = "ETHSTATS_HOST")]
    host: IpAddr,

    /// Port to listen on
    #[arg(long, default_value_t = 3000, env = "ETHSTATS_PORT")]
    port: u16,

    /// Secret every reporter must present
    #[arg(long, env = "ETHSTATS_SECRET")]
    secret: String,

    /// Minimum seconds between repeated alerts for the same node and failure
    #[arg(long, default_value_t = 3600, env = "ETHSTATS_ALERT_WINDOW_SECS")]
    alert_window_secs: u64,

    /// Seconds between digest emails
    #[arg(
        long,
        default_value_t = 86_400,
        env = "ETHSTATS_MONITOR_INTERVAL_SECS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    monitor_interval_secs: u64,

    /// Seconds between snapshot rebroadcasts to dashboards
    #[arg(
        long,
        default_value_t = 15,
        env = "ETHSTATS_BROADCAST_INTERVAL_SECS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    broadcast_interval_secs: u64,

    /// Prefix for alert email subjects
    #[arg(long, default_value = "", env = "ETHSTATS_EMAIL_SUBJECT_PREFIX")]
    email_subject_prefix: String,

    /// Log filter, e.g. `info` or `ethstats_relay=debug`
    #[arg(long, default_value = "info", env = "ETHSTATS_LOG_LEVEL")]
    log_level: String,
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received interrupt signal");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let relay = Relay::new(
        RelayOptions {
            listen_addr: SocketAddr::new(args.host, args.port),
            secret: args.secret,
            hub: HubOptions {
                broadcast_interval: Duration::from_secs(args.broadcast_interval_secs),
                monitor_interval: Duration::from_secs(args.monitor_interval_secs),
                alert_window: Duration::from_secs(args.alert_window_secs),
            },
        },
        TracingMailer::new(args.email_subject_prefix),
    );

    let addr = relay.start().await?;
    info!("ethstats relay running on {}", addr);

    let signal = shutdown_signal().await;
    info!("Shutting down");
    relay.shutdown().await;

    signal?;
    Ok(())
}
