use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::FailureKind;

/// Default suppression window for repeated alerts.
pub const DEFAULT_ALERT_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Suppresses repeated alerts for the same node and failure kind.
///
/// A record is written only when an alert is allowed, so a node that keeps
/// flapping inside the window never pushes its own window forward.
#[derive(Debug)]
pub struct AlertDeduplicator {
    window: Duration,
    last_sent: HashMap<(String, FailureKind), Instant>,
}

impl AlertDeduplicator {
    /// Create a deduplicator with the given suppression window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_sent: HashMap::new(),
        }
    }

    /// Returns `true` and records the attempt if no alert for
    /// `(node_id, kind)` went out within the window.
    pub fn should_send(&mut self, node_id: &str, kind: FailureKind) -> bool {
        self.should_send_at(node_id, kind, Instant::now())
    }

    fn should_send_at(&mut self, node_id: &str, kind: FailureKind, now: Instant) -> bool {
        let key = (node_id.to_string(), kind);
        match self.last_sent.get(&key) {
            Some(last) if now.saturating_duration_since(*last) <= self.window => false,
            _ => {
                self.last_sent.insert(key, now);
                true
            }
        }
    }
}

impl Default for AlertDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_WINDOW)
    }
}
