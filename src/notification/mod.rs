//! Notification pipeline
//!
//! Consumer (event → jobs), dispatcher (job → mail) and the mail transport.

mod consumer;
mod dispatcher;
mod mail;
mod templates;

pub use consumer::{derive_jobs, NotificationConsumer, ProcessOutcome, RetryPolicy};
pub use dispatcher::{DispatchError, NotificationJob, Notifier};
pub use mail::{MailError, MailTransport, OutgoingMail, SmtpMailTransport};
pub use templates::{RenderedMail, Templates};
