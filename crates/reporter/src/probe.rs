//! Local node process health.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};
use url::{Host, Url};

/// Process names checked by default.
pub const DEFAULT_PROBE_PATTERNS: [&str; 3] = ["geth -", "beacon-chain", "validator"];

/// Outcome of a probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessHealth {
    /// Every watched process is running.
    Healthy,
    /// At least one watched process is missing.
    Unhealthy,
}

/// Checks whether the node's processes are running.
#[async_trait]
pub trait ProcessProbe: Debug + Send + Sync + 'static {
    /// Run the check.
    async fn probe(&self) -> ProcessHealth;
}

/// Options for configuring a [`CommandProbe`].
#[derive(Clone, Debug)]
pub struct CommandProbeOptions {
    /// Substrings to look for in the process list. All must match.
    pub patterns: Vec<String>,
}

impl Default for CommandProbeOptions {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_PROBE_PATTERNS.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Probe that greps `ps axu` once per pattern.
#[derive(Clone, Debug, Default)]
pub struct CommandProbe {
    patterns: Vec<String>,
}

impl CommandProbe {
    /// Create a probe for the patterns in `options`.
    #[must_use]
    pub fn new(CommandProbeOptions { patterns }: CommandProbeOptions) -> Self {
        Self { patterns }
    }

    async fn is_running(pattern: &str) -> bool {
        let script = format!(
            "ps axu | grep {} | grep -v grep",
            shell_quote(pattern)
        );

        match Command::new("/bin/sh").arg("-c").arg(&script).output().await {
            Ok(output) => output.status.success() && !output.stdout.is_empty(),
            Err(e) => {
                warn!("failed to run process probe: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl ProcessProbe for CommandProbe {
    async fn probe(&self) -> ProcessHealth {
        for pattern in &self.patterns {
            if !Self::is_running(pattern).await {
                debug!("no process matching '{}'", pattern);
                return ProcessHealth::Unhealthy;
            }
        }

        ProcessHealth::Healthy
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Probe with a settable answer.
#[derive(Debug)]
pub struct StaticProbe {
    healthy: AtomicBool,
}

impl StaticProbe {
    /// Create a probe that answers `health`.
    #[must_use]
    pub fn new(health: ProcessHealth) -> Self {
        Self {
            healthy: AtomicBool::new(health == ProcessHealth::Healthy),
        }
    }

    /// Change the answer.
    pub fn set(&self, health: ProcessHealth) {
        self.healthy
            .store(health == ProcessHealth::Healthy, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProcessProbe for StaticProbe {
    async fn probe(&self) -> ProcessHealth {
        if self.healthy.load(Ordering::SeqCst) {
            ProcessHealth::Healthy
        } else {
            ProcessHealth::Unhealthy
        }
    }
}

/// Whether `url` points at this machine. The probe only means something then.
#[must_use]
pub fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        None => false,
    }
}
