//! wallet_ledger Library
//!
//! Re-exports modules for the server binary, the stress tool and
//! integration tests.

pub mod api;
pub mod bus;
pub mod config;
pub mod db;
pub mod domain;
pub mod ledger;
pub mod notification;
pub mod store;

mod error;

pub use config::Config;
pub use domain::{Amount, AmountError, Balance, LedgerError, Transaction, TransactionType};
pub use error::{AppError, AppResult};
pub use ledger::LedgerEngine;
