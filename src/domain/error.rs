//! Domain Error Types
//!
//! Ledger errors surfaced to callers of the engine.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

/// Which wallet of an operation could not be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletRole {
    /// The single wallet of a deposit or withdraw
    Target,
    Debited,
    Credited,
}

impl std::fmt::Display for WalletRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WalletRole::Target => write!(f, "Wallet"),
            WalletRole::Debited => write!(f, "Debited wallet"),
            WalletRole::Credited => write!(f, "Credited wallet"),
        }
    }
}

/// Errors produced by ledger operations.
///
/// Everything except `Store` is a caller problem and is never retried.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Zero, negative, too precise or too large
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Cannot transfer to the same account")]
    SameAccount,

    #[error("{role} not found: {id}")]
    WalletNotFound { role: WalletRole, id: Uuid },

    #[error("Transaction not found: {0}")]
    TransactionNotFound(Uuid),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    /// Store unavailable or rejected the commit; nothing was persisted
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    pub fn insufficient_funds(required: Decimal, available: Decimal) -> Self {
        Self::InsufficientFunds {
            required,
            available,
        }
    }

    pub fn wallet_not_found(role: WalletRole, id: Uuid) -> Self {
        Self::WalletNotFound { role, id }
    }

    /// Check if this is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Store(_))
    }
}

impl From<super::AmountError> for LedgerError {
    fn from(err: super::AmountError) -> Self {
        Self::InvalidAmount(err.to_string())
    }
}
