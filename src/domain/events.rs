//! Domain Events
//!
//! Facts published on the event bus after a ledger commit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::amount::Amount;
use super::transaction::{Transaction, TransactionType};

/// Topic carrying [`TransactionCreated`] events.
pub const TRANSACTIONS_CREATED_TOPIC: &str = "transactions.created";

/// Published once per committed transaction.
///
/// The `id` doubles as the bus message key, so events for the same
/// transaction always land on the same lane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionCreated {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
}

impl From<&Transaction> for TransactionCreated {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id,
            kind: tx.kind,
            amount: tx.amount,
            created_at: tx.created_at,
        }
    }
}

/// The part of a [`TransactionCreated`] payload a subscriber needs to look
/// the transaction up. Other fields are ignored, so a payload this service
/// could not have produced still identifies its transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionCreatedRef {
    pub id: Uuid,
}

impl From<&TransactionCreated> for TransactionCreatedRef {
    fn from(event: &TransactionCreated) -> Self {
        Self { id: event.id }
    }
}
