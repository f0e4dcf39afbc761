//! Failure alerts for the relay.
//!
//! Holds the session failure taxonomy, the per-node suppression window and
//! the [`Mailer`] capability through which alerts and digests leave the
//! process. Concrete SMTP delivery is left to implementors of [`Mailer`].
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod dedup;
mod error;
mod failure;
mod mailer;

pub use dedup::{AlertDeduplicator, DEFAULT_ALERT_WINDOW};
pub use error::{Error, Result};
pub use failure::FailureKind;
pub use mailer::{Alert, Mailer, TracingMailer, timestamp};
