//! Mock mailer for testing.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use ethstats_alerts::{Error, Mailer, Result};
use parking_lot::Mutex;
use tokio::sync::Notify;

/// A message captured by [`RecordingMailer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMail {
    /// Subject line as passed to the mailer.
    pub subject: String,
    /// Body as passed to the mailer.
    pub body: String,
}

/// Mailer that records every message instead of delivering it.
#[derive(Clone, Debug, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<SentMail>>>,
    failing: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl RecordingMailer {
    /// Create an empty mailer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message recorded so far, in send order.
    #[must_use]
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().clone()
    }

    /// Number of messages recorded so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Make later sends fail after recording them.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Wait until at least `count` messages have been recorded.
    pub async fn wait_for(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.count() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_alert(&self, subject: &str, body: &str) -> Result<()> {
        self.sent.lock().push(SentMail {
            subject: subject.to_string(),
            body: body.to_string(),
        });
        self.notify.notify_waiters();

        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Delivery("mock failure".to_string()));
        }

        Ok(())
    }
}
