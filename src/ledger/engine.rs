//! Ledger Engine
//!
//! Executes deposits, withdrawals and transfers against the ledger store and
//! publishes one `TransactionCreated` per committed transaction.

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::bus::EventBus;
use crate::domain::{
    Amount, LedgerError, MovementKind, NewTransaction, Transaction, TransactionCreated, Wallet,
    WalletRole, TRANSACTIONS_CREATED_TOPIC,
};
use crate::store::LedgerStore;

// =========================================================================
// LedgerEngine
// =========================================================================

/// Entry point for every balance mutation.
#[derive(Clone)]
pub struct LedgerEngine {
    store: Arc<dyn LedgerStore>,
    bus: Arc<EventBus>,
}

impl LedgerEngine {
    pub fn new(store: Arc<dyn LedgerStore>, bus: Arc<EventBus>) -> Self {
        Self { store, bus }
    }

    /// Credit or debit a single wallet.
    pub async fn deposit_or_withdraw(
        &self,
        wallet_id: Uuid,
        amount: Decimal,
        kind: MovementKind,
    ) -> Result<Transaction, LedgerError> {
        let amount = Amount::new(amount)?;

        let mut scope = self.store.begin().await?;
        let wallets = scope.lock_wallets(&[wallet_id]).await?;
        let wallet = find_locked(&wallets, wallet_id, WalletRole::Target)?;

        let new_balance = match kind {
            MovementKind::Deposit => wallet.balance.credit(&amount)?,
            MovementKind::Withdraw => {
                if !wallet.balance.is_sufficient_for(&amount) {
                    return Err(LedgerError::insufficient_funds(
                        amount.value(),
                        wallet.balance.value(),
                    ));
                }
                wallet.balance.debit(&amount)?
            }
        };

        scope.set_balance(wallet_id, new_balance).await?;
        let transaction = scope
            .insert_transaction(NewTransaction::movement(kind, wallet_id, amount))
            .await?;
        scope.commit().await?;

        tracing::info!(
            transaction_id = %transaction.id,
            transaction_type = %transaction.kind,
            wallet_id = %wallet_id,
            amount = %amount,
            "Transaction committed"
        );

        self.publish_created(&transaction).await;
        Ok(transaction)
    }

    /// Move `amount` from one wallet to another.
    pub async fn transfer(
        &self,
        debited_id: Uuid,
        credited_id: Uuid,
        amount: Decimal,
    ) -> Result<Transaction, LedgerError> {
        let amount = Amount::new(amount)?;

        if debited_id == credited_id {
            return Err(LedgerError::SameAccount);
        }

        let mut scope = self.store.begin().await?;
        let wallets = scope.lock_wallets(&[debited_id, credited_id]).await?;
        let debited = find_locked(&wallets, debited_id, WalletRole::Debited)?;
        let credited = find_locked(&wallets, credited_id, WalletRole::Credited)?;

        if !debited.balance.is_sufficient_for(&amount) {
            return Err(LedgerError::insufficient_funds(
                amount.value(),
                debited.balance.value(),
            ));
        }

        scope
            .set_balance(debited_id, debited.balance.debit(&amount)?)
            .await?;
        scope
            .set_balance(credited_id, credited.balance.credit(&amount)?)
            .await?;
        let transaction = scope
            .insert_transaction(NewTransaction::transfer(debited_id, credited_id, amount))
            .await?;
        scope.commit().await?;

        tracing::info!(
            transaction_id = %transaction.id,
            debited_account_id = %debited_id,
            credited_account_id = %credited_id,
            amount = %amount,
            "Transfer committed"
        );

        self.publish_created(&transaction).await;
        Ok(transaction)
    }

    pub async fn transaction(&self, id: Uuid) -> Result<Transaction, LedgerError> {
        self.store
            .find_transaction(id)
            .await?
            .ok_or(LedgerError::TransactionNotFound(id))
    }

    /// Every transaction, newest first.
    pub async fn transactions(&self) -> Result<Vec<Transaction>, LedgerError> {
        Ok(self.store.list_transactions().await?)
    }

    /// Publish after commit. The commit stands even when this fails.
    async fn publish_created(&self, transaction: &Transaction) {
        let event = TransactionCreated::from(transaction);
        if let Err(e) = self.bus.publish(TRANSACTIONS_CREATED_TOPIC, &event).await {
            tracing::error!(
                transaction_id = %transaction.id,
                topic = TRANSACTIONS_CREATED_TOPIC,
                error = %e,
                "Failed to publish transaction event; transaction remains committed"
            );
        }
    }
}

fn find_locked(wallets: &[Wallet], id: Uuid, role: WalletRole) -> Result<&Wallet, LedgerError> {
    wallets
        .iter()
        .find(|wallet| wallet.id == id)
        .ok_or_else(|| LedgerError::wallet_not_found(role, id))
}
