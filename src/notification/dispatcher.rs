//! Notification Dispatcher
//!
//! Renders one job and hands it to the mail transport. No retries here;
//! failures go back to the caller.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Amount, Balance, TransactionType};

use super::mail::{MailError, MailTransport, OutgoingMail};
use super::templates::Templates;

/// One mail to one wallet owner about one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationJob {
    pub transaction_id: Uuid,
    /// How the recipient sees the transaction; the credited side of a
    /// transfer sees a deposit.
    pub perspective: TransactionType,
    pub amount: Amount,
    pub recipient_email: String,
    pub recipient_name: String,
    pub resulting_balance: Option<Balance>,
    pub counterpart_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Failed to deliver notification for transaction {transaction_id}: {source}")]
    Delivery {
        transaction_id: Uuid,
        #[source]
        source: MailError,
    },
}

pub struct Notifier {
    transport: Arc<dyn MailTransport>,
    templates: Templates,
}

impl Notifier {
    pub fn new(transport: Arc<dyn MailTransport>, templates: Templates) -> Self {
        Self {
            transport,
            templates,
        }
    }

    pub async fn notify(&self, job: &NotificationJob) -> Result<(), DispatchError> {
        let rendered = self.templates.render(job);

        self.transport
            .send(OutgoingMail {
                to: job.recipient_email.clone(),
                subject: rendered.subject,
                html_body: rendered.html_body,
            })
            .await
            .map_err(|source| DispatchError::Delivery {
                transaction_id: job.transaction_id,
                source,
            })?;

        tracing::info!(
            transaction_id = %job.transaction_id,
            perspective = %job.perspective,
            recipient = %job.recipient_email,
            "Notification sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<OutgoingMail>>,
        fail: bool,
    }

    #[async_trait]
    impl MailTransport for Outbox {
        async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
            if self.fail {
                return Err(MailError::Transport("relay refused".to_string()));
            }
            self.sent.lock().unwrap().push(mail);
            Ok(())
        }
    }

    fn job() -> NotificationJob {
        NotificationJob {
            transaction_id: Uuid::new_v4(),
            perspective: TransactionType::Deposit,
            amount: Amount::new(dec!(12.5)).unwrap(),
            recipient_email: "bob@example.com".to_string(),
            recipient_name: "Bob".to_string(),
            resulting_balance: None,
            counterpart_name: Some("Ana".to_string()),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_notify_sends_rendered_mail() {
        let outbox = Arc::new(Outbox::default());
        let notifier = Notifier::new(outbox.clone(), Templates::default());

        notifier.notify(&job()).await.unwrap();

        let sent = outbox.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "bob@example.com");
        assert_eq!(sent[0].subject, "Transaction DEPOSIT");
        assert!(sent[0].html_body.contains("12.50"));
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let outbox = Arc::new(Outbox {
            fail: true,
            ..Default::default()
        });
        let notifier = Notifier::new(outbox, Templates::default());

        let err = notifier.notify(&job()).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Delivery {
                source: MailError::Transport(_),
                ..
            }
        ));
    }
}
