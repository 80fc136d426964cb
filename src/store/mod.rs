//! Ledger Store
//!
//! Persistence seam for wallets and transactions. The engine only talks to
//! these traits; PostgreSQL backs production and an in-memory store backs
//! tests and the stress tool.
//!
//! A [`CommitScope`] is the unit of atomicity: wallet locks are held from
//! `lock_wallets` until the scope is committed or dropped, and dropping a
//! scope without committing discards every staged write.

mod memory;
mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Balance, NewTransaction, Transaction, TransactionDetails, Wallet};

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

/// Store-level failures. None of these leave a partial commit behind.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored row violates a domain invariant
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    /// Write attempted on a wallet this scope never locked
    #[error("Wallet {0} is not locked in this commit scope")]
    NotLocked(Uuid),

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Write path used by the ledger engine.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a new commit scope.
    async fn begin(&self) -> Result<Box<dyn CommitScope>, StoreError>;

    /// Read a wallet without locking it.
    async fn find_wallet(&self, id: Uuid) -> Result<Option<Wallet>, StoreError>;

    async fn find_transaction(&self, id: Uuid) -> Result<Option<Transaction>, StoreError>;

    /// All transactions, newest first.
    async fn list_transactions(&self) -> Result<Vec<Transaction>, StoreError>;
}

/// An open, uncommitted unit of work.
#[async_trait]
pub trait CommitScope: Send {
    /// Lock the given wallets for the rest of the scope and return the ones
    /// that exist. Locks are always taken in ascending id order regardless of
    /// the order of `ids`; call this once per scope.
    async fn lock_wallets(&mut self, ids: &[Uuid]) -> Result<Vec<Wallet>, StoreError>;

    /// Stage a new balance for a wallet locked by this scope.
    async fn set_balance(&mut self, wallet_id: Uuid, balance: Balance) -> Result<(), StoreError>;

    /// Stage the transaction row, assigning its id and timestamp.
    async fn insert_transaction(
        &mut self,
        transaction: NewTransaction,
    ) -> Result<Transaction, StoreError>;

    /// Make every staged write visible at once.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Read path used by the notification consumer.
#[async_trait]
pub trait TransactionLookup: Send + Sync {
    /// Load a transaction joined with both wallets' owners.
    async fn find_details(&self, id: Uuid) -> Result<Option<TransactionDetails>, StoreError>;
}

/// Global lock order: ascending, without duplicates.
pub(crate) fn lock_order(ids: &[Uuid]) -> Vec<Uuid> {
    let mut ordered = ids.to_vec();
    ordered.sort_unstable();
    ordered.dedup();
    ordered
}
