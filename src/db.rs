//! Database module
//!
//! Connection and schema checks. The schema itself lives in raw SQL files
//! under `migrations/`.

use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};

/// Tables the ledger needs before it can serve requests
const REQUIRED_TABLES: &[&str] = &["users", "wallets", "transactions"];

/// Open the connection pool
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Simple connectivity check
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!(table = %table, "Required table does not exist");
            return Ok(false);
        }
    }

    Ok(true)
}

/// Apply the bundled schema. Every statement is idempotent.
pub async fn apply_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Unparameterized, so it runs as one multi-statement simple query
    pool.execute(include_str!("../migrations/0001_wallet_ledger.sql"))
        .await?;
    Ok(())
}
