//! Ledger module
//!
//! The transaction engine: the only code allowed to change a wallet balance.

mod engine;

pub use engine::LedgerEngine;
