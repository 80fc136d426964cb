//! Domain module
//!
//! Core domain types and business rules.

pub mod amount;
pub mod error;
pub mod events;
pub mod transaction;

pub use amount::{Amount, AmountError, Balance};
pub use error::{LedgerError, WalletRole};
pub use events::{TransactionCreated, TransactionCreatedRef, TRANSACTIONS_CREATED_TOPIC};
pub use transaction::{
    MovementKind, NewTransaction, Owner, Transaction, TransactionDetails, TransactionType,
    UnknownTransactionType, Wallet, WalletParty,
};
