//! In-memory Ledger Store
//!
//! Same locking discipline as the PostgreSQL store: one async mutex per
//! wallet, held for the lifetime of a commit scope. Committed state sits
//! behind a single `RwLock` and is only written in `commit`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::domain::{
    Balance, NewTransaction, Owner, Transaction, TransactionDetails, Wallet, WalletParty,
};

use super::{lock_order, CommitScope, LedgerStore, StoreError, TransactionLookup};

#[derive(Debug, Default)]
struct LedgerState {
    owners: HashMap<Uuid, Owner>,
    wallets: HashMap<Uuid, Wallet>,
    transactions: Vec<Transaction>,
}

#[derive(Debug, Default)]
struct Inner {
    state: RwLock<LedgerState>,
    wallet_locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
    fail_commits: AtomicBool,
}

impl Inner {
    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Unavailable("ledger state lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerState>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Unavailable("ledger state lock poisoned".to_string()))
    }

    fn wallet_lock(&self, id: Uuid) -> Result<Arc<tokio::sync::Mutex<()>>, StoreError> {
        let mut locks = self
            .wallet_locks
            .lock()
            .map_err(|_| StoreError::Unavailable("wallet lock table poisoned".to_string()))?;
        Ok(locks.entry(id).or_default().clone())
    }
}

/// Process-local ledger store.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    inner: Arc<Inner>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a wallet owner (account opening happens outside the ledger).
    pub fn add_owner(&self, name: &str, email: &str) -> Result<Owner, StoreError> {
        let owner = Owner {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
        };
        self.inner.write()?.owners.insert(owner.id, owner.clone());
        Ok(owner)
    }

    /// Open the single wallet of `owner_id` with an opening balance.
    pub fn open_wallet(&self, owner_id: Uuid, opening: Balance) -> Result<Wallet, StoreError> {
        let mut state = self.inner.write()?;
        if !state.owners.contains_key(&owner_id) {
            return Err(StoreError::Conflict(format!("unknown owner {owner_id}")));
        }
        if state.wallets.values().any(|w| w.user_id == owner_id) {
            return Err(StoreError::Conflict(format!(
                "owner {owner_id} already has a wallet"
            )));
        }

        let wallet = Wallet {
            id: Uuid::new_v4(),
            user_id: owner_id,
            balance: opening,
        };
        state.wallets.insert(wallet.id, wallet.clone());
        Ok(wallet)
    }

    /// Make every subsequent commit fail as if the store went away.
    pub fn set_commit_failure(&self, fail: bool) {
        self.inner.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of all wallets.
    pub fn wallets(&self) -> Result<Vec<Wallet>, StoreError> {
        Ok(self.inner.read()?.wallets.values().cloned().collect())
    }

    /// Transactions in commit order.
    pub fn transaction_log(&self) -> Result<Vec<Transaction>, StoreError> {
        Ok(self.inner.read()?.transactions.clone())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn CommitScope>, StoreError> {
        Ok(Box::new(MemoryCommitScope {
            inner: self.inner.clone(),
            guards: Vec::new(),
            locked: HashMap::new(),
            staged_balances: HashMap::new(),
            staged_transactions: Vec::new(),
        }))
    }

    async fn find_wallet(&self, id: Uuid) -> Result<Option<Wallet>, StoreError> {
        Ok(self.inner.read()?.wallets.get(&id).cloned())
    }

    async fn find_transaction(&self, id: Uuid) -> Result<Option<Transaction>, StoreError> {
        Ok(self
            .inner
            .read()?
            .transactions
            .iter()
            .find(|tx| tx.id == id)
            .cloned())
    }

    async fn list_transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        let mut transactions = self.inner.read()?.transactions.clone();
        transactions.reverse();
        Ok(transactions)
    }
}

#[async_trait]
impl TransactionLookup for MemoryLedgerStore {
    async fn find_details(&self, id: Uuid) -> Result<Option<TransactionDetails>, StoreError> {
        let state = self.inner.read()?;
        let Some(transaction) = state.transactions.iter().find(|tx| tx.id == id).cloned() else {
            return Ok(None);
        };

        let party = |wallet_id: Option<Uuid>| -> Option<WalletParty> {
            let wallet = state.wallets.get(&wallet_id?)?;
            let owner = state.owners.get(&wallet.user_id)?;
            Some(WalletParty {
                wallet_id: wallet.id,
                balance: wallet.balance,
                owner: owner.clone(),
            })
        };

        Ok(Some(TransactionDetails {
            debited: party(transaction.debited_account_id),
            credited: party(transaction.credited_account_id),
            transaction,
        }))
    }
}

struct MemoryCommitScope {
    inner: Arc<Inner>,
    guards: Vec<OwnedMutexGuard<()>>,
    locked: HashMap<Uuid, Wallet>,
    staged_balances: HashMap<Uuid, Balance>,
    staged_transactions: Vec<Transaction>,
}

#[async_trait]
impl CommitScope for MemoryCommitScope {
    async fn lock_wallets(&mut self, ids: &[Uuid]) -> Result<Vec<Wallet>, StoreError> {
        for id in lock_order(ids) {
            let exists = self.inner.read()?.wallets.contains_key(&id);
            if !exists || self.locked.contains_key(&id) {
                continue;
            }

            let guard = self.inner.wallet_lock(id)?.lock_owned().await;
            // Re-read under the lock: this is the balance every check must use
            let current = self.inner.read()?.wallets.get(&id).cloned();
            if let Some(wallet) = current {
                self.locked.insert(id, wallet);
            }
            self.guards.push(guard);
        }

        let mut wallets: Vec<Wallet> = lock_order(ids)
            .into_iter()
            .filter_map(|id| self.locked.get(&id).cloned())
            .collect();
        for wallet in &mut wallets {
            if let Some(balance) = self.staged_balances.get(&wallet.id) {
                wallet.balance = *balance;
            }
        }
        Ok(wallets)
    }

    async fn set_balance(&mut self, wallet_id: Uuid, balance: Balance) -> Result<(), StoreError> {
        if !self.locked.contains_key(&wallet_id) {
            return Err(StoreError::NotLocked(wallet_id));
        }
        self.staged_balances.insert(wallet_id, balance);
        Ok(())
    }

    async fn insert_transaction(
        &mut self,
        transaction: NewTransaction,
    ) -> Result<Transaction, StoreError> {
        let transaction = transaction.into_transaction(Uuid::new_v4(), Utc::now());
        self.staged_transactions.push(transaction.clone());
        Ok(transaction)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let scope = *self;
        if scope.inner.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("commit rejected".to_string()));
        }

        let mut state = scope.inner.write()?;
        if let Some(missing) = scope
            .staged_balances
            .keys()
            .find(|id| !state.wallets.contains_key(*id))
        {
            return Err(StoreError::NotLocked(*missing));
        }
        for (wallet_id, balance) in scope.staged_balances {
            if let Some(wallet) = state.wallets.get_mut(&wallet_id) {
                wallet.balance = balance;
            }
        }
        state.transactions.extend(scope.staged_transactions);
        drop(state);

        // Wallet locks are released only after the new state is visible
        drop(scope.guards);
        Ok(())
    }
}
