//! Error handling module
//!
//! HTTP-facing error type and response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::LedgerError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Ledger errors
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    // Server errors (5xx)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }

            AppError::Ledger(ledger_err) => match ledger_err {
                LedgerError::InvalidAmount(msg) => {
                    (StatusCode::BAD_REQUEST, "invalid_amount", Some(msg.clone()))
                }
                LedgerError::SameAccount => {
                    (StatusCode::BAD_REQUEST, "same_account_transfer", None)
                }
                LedgerError::InsufficientFunds { .. } => (
                    StatusCode::BAD_REQUEST,
                    "insufficient_funds",
                    Some(ledger_err.to_string()),
                ),
                LedgerError::WalletNotFound { id, .. } => {
                    (StatusCode::NOT_FOUND, "wallet_not_found", Some(id.to_string()))
                }
                LedgerError::TransactionNotFound(id) => (
                    StatusCode::NOT_FOUND,
                    "transaction_not_found",
                    Some(id.to_string()),
                ),
                LedgerError::Store(e) => {
                    tracing::error!("Store error: {:?}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, "store_error", None)
                }
            },

            // 500 Internal Server Error
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        // Infrastructure details stay in the logs
        let error = if status.is_server_error() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error,
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WalletRole;
    use crate::store::StoreError;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_ledger_error_status_mapping() {
        assert_eq!(
            status_of(LedgerError::InvalidAmount("zero".to_string()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(LedgerError::SameAccount.into()), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(LedgerError::insufficient_funds(dec!(50), dec!(30)).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(LedgerError::wallet_not_found(WalletRole::Debited, Uuid::new_v4()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(LedgerError::TransactionNotFound(Uuid::new_v4()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(LedgerError::Store(StoreError::Unavailable("down".to_string())).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_invalid_request_is_bad_request() {
        assert_eq!(
            status_of(AppError::InvalidRequest("bad".to_string())),
            StatusCode::BAD_REQUEST
        );
    }
}
