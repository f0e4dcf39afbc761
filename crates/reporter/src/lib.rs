//! Node-side reporter.
//!
//! A [`ReporterClient`] logs in to the relay every report interval and, on
//! each tick, either sends a status report read from the chain client or
//! measures round-trip latency with a `node-ping`. Any failure ends the run;
//! [`ReporterClient::start`] reconnects after a fixed pause until shut down.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod chain;
mod client;
mod error;
mod probe;
mod stats;

pub use chain::{
    ChainClient, DEFAULT_CHAIN_TIMEOUT, RpcChainClient, RpcChainClientOptions, parse_quantity,
};
pub use client::{
    LATENCY_DELAY, PONG_TIMEOUT, REPORT_INTERVAL, RESTART_DELAY, ReporterClient, ReporterOptions,
};
pub use error::{Error, Result};
pub use probe::{
    CommandProbe, CommandProbeOptions, DEFAULT_PROBE_PATTERNS, ProcessHealth, ProcessProbe,
    StaticProbe, is_loopback,
};
pub use stats::collect_stats;
