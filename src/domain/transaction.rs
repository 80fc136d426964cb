//! Ledger records
//!
//! Wallets, transactions and the owner data joined onto them for notifications.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::amount::{Amount, Balance};

/// Kind of a ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Withdraw,
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Withdraw => "WITHDRAW",
            TransactionType::Transfer => "TRANSFER",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = UnknownTransactionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEPOSIT" => Ok(TransactionType::Deposit),
            "WITHDRAW" => Ok(TransactionType::Withdraw),
            "TRANSFER" => Ok(TransactionType::Transfer),
            other => Err(UnknownTransactionType(other.to_string())),
        }
    }
}

/// A stored transaction type that is not one of the three known kinds.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown transaction type: {0}")]
pub struct UnknownTransactionType(pub String);

/// Single-wallet movement accepted by `deposit_or_withdraw`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    Deposit,
    Withdraw,
}

impl From<MovementKind> for TransactionType {
    fn from(kind: MovementKind) -> Self {
        match kind {
            MovementKind::Deposit => TransactionType::Deposit,
            MovementKind::Withdraw => TransactionType::Withdraw,
        }
    }
}

impl TryFrom<TransactionType> for MovementKind {
    type Error = TransactionType;

    fn try_from(value: TransactionType) -> Result<Self, Self::Error> {
        match value {
            TransactionType::Deposit => Ok(MovementKind::Deposit),
            TransactionType::Withdraw => Ok(MovementKind::Withdraw),
            TransactionType::Transfer => Err(value),
        }
    }
}

/// A user's wallet. The balance is only ever changed by the ledger engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub balance: Balance,
}

/// An immutable ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: Amount,
    pub debited_account_id: Option<Uuid>,
    pub credited_account_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Signed effect of this transaction on `wallet_id`'s balance.
    pub fn effect_on(&self, wallet_id: Uuid) -> Decimal {
        let mut delta = Decimal::ZERO;
        if self.credited_account_id == Some(wallet_id) {
            delta += self.amount.value();
        }
        if self.debited_account_id == Some(wallet_id) {
            delta -= self.amount.value();
        }
        delta
    }
}

/// A transaction that has not been committed yet.
///
/// The constructors are the only way to build one, so the debited/credited
/// slots always match the transaction type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    kind: TransactionType,
    amount: Amount,
    debited_account_id: Option<Uuid>,
    credited_account_id: Option<Uuid>,
}

impl NewTransaction {
    pub fn deposit(wallet_id: Uuid, amount: Amount) -> Self {
        Self {
            kind: TransactionType::Deposit,
            amount,
            debited_account_id: None,
            credited_account_id: Some(wallet_id),
        }
    }

    pub fn withdraw(wallet_id: Uuid, amount: Amount) -> Self {
        Self {
            kind: TransactionType::Withdraw,
            amount,
            debited_account_id: Some(wallet_id),
            credited_account_id: None,
        }
    }

    /// Caller must ensure `debited != credited`.
    pub fn transfer(debited: Uuid, credited: Uuid, amount: Amount) -> Self {
        debug_assert_ne!(debited, credited);
        Self {
            kind: TransactionType::Transfer,
            amount,
            debited_account_id: Some(debited),
            credited_account_id: Some(credited),
        }
    }

    pub fn movement(kind: MovementKind, wallet_id: Uuid, amount: Amount) -> Self {
        match kind {
            MovementKind::Deposit => Self::deposit(wallet_id, amount),
            MovementKind::Withdraw => Self::withdraw(wallet_id, amount),
        }
    }

    pub fn kind(&self) -> TransactionType {
        self.kind
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn debited_account_id(&self) -> Option<Uuid> {
        self.debited_account_id
    }

    pub fn credited_account_id(&self) -> Option<Uuid> {
        self.credited_account_id
    }

    /// Stamp identity and commit time.
    pub fn into_transaction(self, id: Uuid, created_at: DateTime<Utc>) -> Transaction {
        Transaction {
            id,
            kind: self.kind,
            amount: self.amount,
            debited_account_id: self.debited_account_id,
            credited_account_id: self.credited_account_id,
            created_at,
        }
    }
}

/// Wallet owner as far as notifications care.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// One side of a transaction joined with its wallet owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletParty {
    pub wallet_id: Uuid,
    /// Balance at the time the details were read, not at commit time.
    pub balance: Balance,
    pub owner: Owner,
}

/// A transaction with both sides resolved to their owners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDetails {
    pub transaction: Transaction,
    pub debited: Option<WalletParty>,
    pub credited: Option<WalletParty>,
}
