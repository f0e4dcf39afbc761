use std::fmt::Debug;
use std::net::SocketAddr;

use async_trait::async_trait;
use tracing::warn;

use crate::{FailureKind, Result};

/// Capability to deliver an alert to operators.
#[async_trait]
pub trait Mailer: Debug + Send + Sync + 'static {
    /// Deliver one message.
    async fn send_alert(&self, subject: &str, body: &str) -> Result<()>;
}

/// Mailer that writes alerts to the log instead of delivering them.
#[derive(Clone, Debug, Default)]
pub struct TracingMailer {
    subject_prefix: String,
}

impl TracingMailer {
    /// Create a mailer that prepends `subject_prefix` to every subject.
    #[must_use]
    pub fn new(subject_prefix: impl Into<String>) -> Self {
        Self {
            subject_prefix: subject_prefix.into(),
        }
    }
}

#[async_trait]
impl Mailer for TracingMailer {
    async fn send_alert(&self, subject: &str, body: &str) -> Result<()> {
        warn!(subject = %format!("{}{subject}", self.subject_prefix), body, "alert");
        Ok(())
    }
}

/// Local wall-clock time in the format used by alert subjects.
#[must_use]
pub fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// A failure alert for one node session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alert {
    /// Login identity of the node.
    pub node_id: String,
    /// Why the session ended.
    pub kind: FailureKind,
    /// Address the session was connected from.
    pub remote_addr: SocketAddr,
}

impl Alert {
    /// Subject line, stamped with the current local time.
    #[must_use]
    pub fn subject(&self) -> String {
        format!("{}-node error", timestamp())
    }

    /// Message body.
    #[must_use]
    pub fn body(&self) -> String {
        format!(
            "node: [{}-{}] {}",
            self.node_id,
            self.remote_addr,
            self.kind.description()
        )
    }
}
