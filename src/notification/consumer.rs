//! Notification Consumer
//!
//! Handles `transactions.created` events: re-reads the transaction with both
//! owners, turns it into mail jobs and dispatches them.
//!
//! The event can arrive before the commit that produced it is visible to
//! this reader, so the lookup is retried a few times before giving up.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::bus::{EventHandler, HandlerError};
use crate::domain::{TransactionCreatedRef, TransactionDetails, TransactionType, WalletParty};
use crate::store::TransactionLookup;

use super::dispatcher::{NotificationJob, Notifier};

/// Bounded lookup retry with a fixed pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

/// What became of one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The transaction was found and every job was handed to the notifier
    Dispatched { sent: usize, failed: usize },
    /// The transaction never became visible; nothing was sent
    GaveUp,
}

pub struct NotificationConsumer {
    lookup: Arc<dyn TransactionLookup>,
    notifier: Arc<Notifier>,
    retry: RetryPolicy,
}

impl NotificationConsumer {
    pub fn new(
        lookup: Arc<dyn TransactionLookup>,
        notifier: Arc<Notifier>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            lookup,
            notifier,
            retry,
        }
    }

    /// Process one event. Nothing here is returned as an error: a missing
    /// transaction or a failed mail is logged and the event is done.
    pub async fn process(&self, transaction_id: Uuid) -> ProcessOutcome {
        let Some(details) = self.resolve(transaction_id).await else {
            tracing::error!(
                transaction_id = %transaction_id,
                attempts = self.retry.attempts,
                "Transaction not found after retries; dropping notification"
            );
            return ProcessOutcome::GaveUp;
        };

        let (mut sent, mut failed) = (0, 0);
        for job in derive_jobs(&details) {
            match self.notifier.notify(&job).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    failed += 1;
                    tracing::error!(
                        transaction_id = %job.transaction_id,
                        recipient = %job.recipient_email,
                        error = %e,
                        "Notification dispatch failed"
                    );
                }
            }
        }

        ProcessOutcome::Dispatched { sent, failed }
    }

    async fn resolve(&self, id: Uuid) -> Option<TransactionDetails> {
        let attempts = self.retry.attempts.max(1);

        for attempt in 1..=attempts {
            match self.lookup.find_details(id).await {
                Ok(Some(details)) => return Some(details),
                Ok(None) => {
                    tracing::warn!(transaction_id = %id, attempt, attempts, "Transaction not visible yet");
                }
                Err(e) => {
                    tracing::warn!(transaction_id = %id, attempt, attempts, error = %e, "Transaction lookup failed");
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.retry.backoff).await;
            }
        }

        None
    }
}

#[async_trait]
impl EventHandler<TransactionCreatedRef> for NotificationConsumer {
    async fn handle(&self, event: TransactionCreatedRef) -> Result<(), HandlerError> {
        self.process(event.id).await;
        Ok(())
    }
}

/// Jobs for a resolved transaction, debited side first.
///
/// - debited owner: the transaction's own type, the credited owner as
///   counterpart
/// - credited owner of a transfer or deposit: a deposit, the debited owner as
///   counterpart
pub fn derive_jobs(details: &TransactionDetails) -> Vec<NotificationJob> {
    let tx = &details.transaction;
    let mut jobs = Vec::with_capacity(2);

    if let Some(debited) = &details.debited {
        jobs.push(job_for(details, debited, tx.kind, details.credited.as_ref()));
    }

    if matches!(tx.kind, TransactionType::Transfer | TransactionType::Deposit) {
        if let Some(credited) = &details.credited {
            jobs.push(job_for(
                details,
                credited,
                TransactionType::Deposit,
                details.debited.as_ref(),
            ));
        }
    }

    jobs
}

fn job_for(
    details: &TransactionDetails,
    recipient: &WalletParty,
    perspective: TransactionType,
    counterpart: Option<&WalletParty>,
) -> NotificationJob {
    NotificationJob {
        transaction_id: details.transaction.id,
        perspective,
        amount: details.transaction.amount,
        recipient_email: recipient.owner.email.clone(),
        recipient_name: recipient.owner.name.clone(),
        resulting_balance: Some(recipient.balance),
        counterpart_name: counterpart.map(|party| party.owner.name.clone()),
        created_at: details.transaction.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Amount, Balance, NewTransaction, Owner};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn party(name: &str, balance: rust_decimal::Decimal) -> WalletParty {
        WalletParty {
            wallet_id: Uuid::new_v4(),
            balance: Balance::new(balance).unwrap(),
            owner: Owner {
                id: Uuid::new_v4(),
                name: name.to_string(),
                email: format!("{}@example.com", name.to_lowercase()),
            },
        }
    }

    fn amount() -> Amount {
        Amount::new(dec!(100)).unwrap()
    }

    #[test]
    fn test_transfer_yields_two_jobs() {
        let ana = party("Ana", dec!(400));
        let bob = party("Bob", dec!(300));
        let tx = NewTransaction::transfer(ana.wallet_id, bob.wallet_id, amount())
            .into_transaction(Uuid::new_v4(), Utc::now());
        let details = TransactionDetails {
            transaction: tx,
            debited: Some(ana),
            credited: Some(bob),
        };

        let jobs = derive_jobs(&details);
        assert_eq!(jobs.len(), 2);

        assert_eq!(jobs[0].recipient_email, "ana@example.com");
        assert_eq!(jobs[0].perspective, TransactionType::Transfer);
        assert_eq!(jobs[0].counterpart_name.as_deref(), Some("Bob"));
        assert_eq!(jobs[0].resulting_balance.unwrap().value(), dec!(400));

        assert_eq!(jobs[1].recipient_email, "bob@example.com");
        assert_eq!(jobs[1].perspective, TransactionType::Deposit);
        assert_eq!(jobs[1].counterpart_name.as_deref(), Some("Ana"));
        assert_eq!(jobs[1].resulting_balance.unwrap().value(), dec!(300));
    }

    #[test]
    fn test_withdraw_yields_debited_job_only() {
        let ana = party("Ana", dec!(10));
        let tx = NewTransaction::withdraw(ana.wallet_id, amount())
            .into_transaction(Uuid::new_v4(), Utc::now());
        let details = TransactionDetails {
            transaction: tx,
            debited: Some(ana),
            credited: None,
        };

        let jobs = derive_jobs(&details);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].perspective, TransactionType::Withdraw);
        assert_eq!(jobs[0].counterpart_name, None);
    }

    #[test]
    fn test_deposit_notifies_credited_owner() {
        let ana = party("Ana", dec!(110));
        let tx = NewTransaction::deposit(ana.wallet_id, amount())
            .into_transaction(Uuid::new_v4(), Utc::now());
        let details = TransactionDetails {
            transaction: tx,
            debited: None,
            credited: Some(ana),
        };

        let jobs = derive_jobs(&details);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].recipient_name, "Ana");
        assert_eq!(jobs[0].perspective, TransactionType::Deposit);
    }

    #[test]
    fn test_transfer_with_missing_owner_row() {
        let ana = party("Ana", dec!(400));
        let tx = NewTransaction::transfer(ana.wallet_id, Uuid::new_v4(), amount())
            .into_transaction(Uuid::new_v4(), Utc::now());
        let details = TransactionDetails {
            transaction: tx,
            debited: Some(ana),
            credited: None,
        };

        let jobs = derive_jobs(&details);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].counterpart_name, None);
    }

    #[test]
    fn test_default_retry_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts, 3);
        assert_eq!(policy.backoff, Duration::from_secs(1));
    }
}
