//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::{MovementKind, Transaction, TransactionType};
use crate::error::AppError;
use crate::ledger::LedgerEngine;

/// Shared state of every handler
#[derive(Clone)]
pub struct AppState {
    pub engine: LedgerEngine,
}

// =========================================================================
// Request types
// =========================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositWithdrawRequest {
    pub wallet_id: Uuid,
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: TransactionType,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub debited_account_id: Uuid,
    pub credited_account_id: Uuid,
    pub amount: Decimal,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/transactions", get(list_transactions))
        .route("/transactions/:transaction_id", get(get_transaction))
        .route("/transactions/deposit-withdraw", post(deposit_withdraw))
        .route("/transactions/transfer", post(transfer))
}

// =========================================================================
// GET /transactions
// =========================================================================

/// All transactions, newest first
async fn list_transactions(
    State(state): State<AppState>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    Ok(Json(state.engine.transactions().await?))
}

// =========================================================================
// GET /transactions/:transaction_id
// =========================================================================

async fn get_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<Transaction>, AppError> {
    Ok(Json(state.engine.transaction(transaction_id).await?))
}

// =========================================================================
// POST /transactions/deposit-withdraw
// =========================================================================

async fn deposit_withdraw(
    State(state): State<AppState>,
    request: Result<Json<DepositWithdrawRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let Json(request) = request.map_err(|e| AppError::InvalidRequest(e.body_text()))?;

    let kind = MovementKind::try_from(request.kind).map_err(|kind| {
        AppError::InvalidRequest(format!(
            "{kind} is not allowed here, use /transactions/transfer"
        ))
    })?;

    let transaction = state
        .engine
        .deposit_or_withdraw(request.wallet_id, request.amount, kind)
        .await?;

    Ok((StatusCode::CREATED, Json(transaction)))
}

// =========================================================================
// POST /transactions/transfer
// =========================================================================

async fn transfer(
    State(state): State<AppState>,
    request: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let Json(request) = request.map_err(|e| AppError::InvalidRequest(e.body_text()))?;

    let transaction = state
        .engine
        .transfer(
            request.debited_account_id,
            request.credited_account_id,
            request.amount,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(transaction)))
}
