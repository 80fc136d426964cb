//! PostgreSQL Ledger Store
//!
//! A commit scope is one database transaction. Wallet rows are locked with
//! `SELECT ... FOR UPDATE`, one row at a time in ascending id order, so two
//! transfers between the same pair of wallets can never deadlock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row};
use std::collections::HashSet;
use uuid::Uuid;

use crate::domain::{
    Amount, Balance, NewTransaction, Owner, Transaction, TransactionDetails, TransactionType,
    Wallet, WalletParty,
};

use super::{lock_order, CommitScope, LedgerStore, StoreError, TransactionLookup};

/// Ledger store backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> Result<Box<dyn CommitScope>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgCommitScope {
            tx,
            locked: HashSet::new(),
        }))
    }

    async fn find_wallet(&self, id: Uuid) -> Result<Option<Wallet>, StoreError> {
        let row: Option<(Uuid, Uuid, Decimal)> =
            sqlx::query_as("SELECT id, user_id, balance FROM wallets WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(wallet_from_parts).transpose()
    }

    async fn find_transaction(&self, id: Uuid) -> Result<Option<Transaction>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, type, amount, debited_account_id, credited_account_id, created_at
            FROM transactions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn list_transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, type, amount, debited_account_id, credited_account_id, created_at
            FROM transactions
            ORDER BY created_at DESC, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(transaction_from_row).collect()
    }
}

#[async_trait]
impl TransactionLookup for PgLedgerStore {
    async fn find_details(&self, id: Uuid) -> Result<Option<TransactionDetails>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                t.id, t.type, t.amount, t.debited_account_id, t.credited_account_id, t.created_at,
                dw.balance AS debited_balance,
                du.id AS debited_owner_id, du.name AS debited_owner_name, du.email AS debited_owner_email,
                cw.balance AS credited_balance,
                cu.id AS credited_owner_id, cu.name AS credited_owner_name, cu.email AS credited_owner_email
            FROM transactions t
            LEFT JOIN wallets dw ON dw.id = t.debited_account_id
            LEFT JOIN users du ON du.id = dw.user_id
            LEFT JOIN wallets cw ON cw.id = t.credited_account_id
            LEFT JOIN users cu ON cu.id = cw.user_id
            WHERE t.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let transaction = transaction_from_row(&row)?;
        let debited = party_from_row(&row, "debited", transaction.debited_account_id)?;
        let credited = party_from_row(&row, "credited", transaction.credited_account_id)?;

        Ok(Some(TransactionDetails {
            transaction,
            debited,
            credited,
        }))
    }
}

struct PgCommitScope {
    tx: sqlx::Transaction<'static, Postgres>,
    locked: HashSet<Uuid>,
}

#[async_trait]
impl CommitScope for PgCommitScope {
    async fn lock_wallets(&mut self, ids: &[Uuid]) -> Result<Vec<Wallet>, StoreError> {
        let mut wallets = Vec::with_capacity(ids.len());

        for id in lock_order(ids) {
            let row: Option<(Uuid, Uuid, Decimal)> = sqlx::query_as(
                "SELECT id, user_id, balance FROM wallets WHERE id = $1 FOR UPDATE",
            )
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

            if let Some(parts) = row {
                self.locked.insert(id);
                wallets.push(wallet_from_parts(parts)?);
            }
        }

        Ok(wallets)
    }

    async fn set_balance(&mut self, wallet_id: Uuid, balance: Balance) -> Result<(), StoreError> {
        if !self.locked.contains(&wallet_id) {
            return Err(StoreError::NotLocked(wallet_id));
        }

        sqlx::query("UPDATE wallets SET balance = $2, updated_at = NOW() WHERE id = $1")
            .bind(wallet_id)
            .bind(balance.value())
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn insert_transaction(
        &mut self,
        transaction: NewTransaction,
    ) -> Result<Transaction, StoreError> {
        let id = Uuid::new_v4();

        let created_at: DateTime<Utc> = sqlx::query_scalar(
            r#"
            INSERT INTO transactions (id, type, amount, debited_account_id, credited_account_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING created_at
            "#,
        )
        .bind(id)
        .bind(transaction.kind().as_str())
        .bind(transaction.amount().value())
        .bind(transaction.debited_account_id())
        .bind(transaction.credited_account_id())
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(transaction.into_transaction(id, created_at))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let scope = *self;
        scope.tx.commit().await?;
        Ok(())
    }
}

fn wallet_from_parts((id, user_id, balance): (Uuid, Uuid, Decimal)) -> Result<Wallet, StoreError> {
    let balance = Balance::new(balance)
        .map_err(|e| StoreError::InvalidData(format!("wallet {id}: {e}")))?;
    Ok(Wallet {
        id,
        user_id,
        balance,
    })
}

fn transaction_from_row(row: &PgRow) -> Result<Transaction, StoreError> {
    let id: Uuid = row.try_get("id")?;
    let kind: String = row.try_get("type")?;
    let amount: Decimal = row.try_get("amount")?;

    let kind: TransactionType = kind
        .parse()
        .map_err(|e| StoreError::InvalidData(format!("transaction {id}: {e}")))?;
    let amount = Amount::new(amount)
        .map_err(|e| StoreError::InvalidData(format!("transaction {id}: {e}")))?;

    Ok(Transaction {
        id,
        kind,
        amount,
        debited_account_id: row.try_get("debited_account_id")?,
        credited_account_id: row.try_get("credited_account_id")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Columns are `<side>_balance` and `<side>_owner_{id,name,email}`, all
/// NULL when the side is empty.
fn party_from_row(
    row: &PgRow,
    side: &str,
    wallet_id: Option<Uuid>,
) -> Result<Option<WalletParty>, StoreError> {
    let Some(wallet_id) = wallet_id else {
        return Ok(None);
    };

    let balance: Option<Decimal> = row.try_get(format!("{side}_balance").as_str())?;
    let owner_id: Option<Uuid> = row.try_get(format!("{side}_owner_id").as_str())?;
    let name: Option<String> = row.try_get(format!("{side}_owner_name").as_str())?;
    let email: Option<String> = row.try_get(format!("{side}_owner_email").as_str())?;

    let (Some(balance), Some(id), Some(name), Some(email)) = (balance, owner_id, name, email) else {
        return Ok(None);
    };

    let balance = Balance::new(balance)
        .map_err(|e| StoreError::InvalidData(format!("wallet {wallet_id}: {e}")))?;

    Ok(Some(WalletParty {
        wallet_id,
        balance,
        owner: Owner { id, name, email },
    }))
}
