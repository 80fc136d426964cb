//! API Integration Tests

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

use wallet_ledger::api::{self, AppState};

mod common;

use common::{balance_of, open_wallet, setup_ledger, Ledger};

async fn setup_app() -> (Router, Ledger) {
    let ledger = setup_ledger().await;
    let app = api::build_router(AppState {
        engine: ledger.engine.clone(),
    });
    (app, ledger)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (app, _) = setup_app().await;

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"OK");
}

#[tokio::test]
async fn test_deposit_then_fetch() {
    let (app, ledger) = setup_app().await;
    let wallet = open_wallet(&ledger.store, "Ana", dec!(0));

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/transactions/deposit-withdraw",
            json!({"walletId": wallet.id, "amount": "150.75", "type": "DEPOSIT"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(response.headers().contains_key("x-correlation-id"));

    let created = body_json(response).await;
    assert_eq!(created["type"], "DEPOSIT");
    assert_eq!(created["amount"], "150.75");
    assert_eq!(created["creditedAccountId"], wallet.id.to_string());
    assert_eq!(created["debitedAccountId"], Value::Null);
    assert_eq!(balance_of(&ledger.store, wallet.id), dec!(150.75));

    let id = created["id"].as_str().unwrap();
    let response = app
        .clone()
        .oneshot(get(&format!("/api/v1/transactions/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, created);

    let response = app.oneshot(get("/api/v1/transactions")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_numeric_amount_accepted() {
    let (app, ledger) = setup_app().await;
    let wallet = open_wallet(&ledger.store, "Ana", dec!(100));

    let response = app
        .oneshot(post_json(
            "/api/v1/transactions/deposit-withdraw",
            json!({"walletId": wallet.id, "amount": 40, "type": "WITHDRAW"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(balance_of(&ledger.store, wallet.id), dec!(60));
}

#[tokio::test]
async fn test_transfer_endpoint() {
    let (app, ledger) = setup_app().await;
    let a = open_wallet(&ledger.store, "Ana", dec!(500));
    let b = open_wallet(&ledger.store, "Bob", dec!(200));

    let response = app
        .oneshot(post_json(
            "/api/v1/transactions/transfer",
            json!({"debitedAccountId": a.id, "creditedAccountId": b.id, "amount": "100"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["type"], "TRANSFER");
    assert_eq!(balance_of(&ledger.store, a.id), dec!(400));
    assert_eq!(balance_of(&ledger.store, b.id), dec!(300));
}

#[tokio::test]
async fn test_insufficient_funds_is_bad_request() {
    let (app, ledger) = setup_app().await;
    let wallet = open_wallet(&ledger.store, "Ana", dec!(30));

    let response = app
        .oneshot(post_json(
            "/api/v1/transactions/deposit-withdraw",
            json!({"walletId": wallet.id, "amount": "50", "type": "WITHDRAW"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error_code"], "insufficient_funds");
    assert_eq!(balance_of(&ledger.store, wallet.id), dec!(30));
}

#[tokio::test]
async fn test_validation_errors() {
    let (app, ledger) = setup_app().await;
    let wallet = open_wallet(&ledger.store, "Ana", dec!(30));

    let cases = [
        (
            "/api/v1/transactions/deposit-withdraw",
            json!({"walletId": wallet.id, "amount": "0", "type": "DEPOSIT"}),
            "invalid_amount",
        ),
        (
            "/api/v1/transactions/deposit-withdraw",
            json!({"walletId": wallet.id, "amount": "10", "type": "TRANSFER"}),
            "invalid_request",
        ),
        (
            "/api/v1/transactions/deposit-withdraw",
            json!({"walletId": wallet.id, "amount": "10", "type": "REFUND"}),
            "invalid_request",
        ),
        (
            "/api/v1/transactions/transfer",
            json!({"debitedAccountId": wallet.id, "creditedAccountId": wallet.id, "amount": "1"}),
            "same_account_transfer",
        ),
    ];

    for (uri, body, code) in cases {
        let response = app.clone().oneshot(post_json(uri, body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{code}");
        assert_eq!(body_json(response).await["error_code"], code);
    }
    assert!(ledger.store.transaction_log().unwrap().is_empty());
}

#[tokio::test]
async fn test_not_found() {
    let (app, ledger) = setup_app().await;
    let wallet = open_wallet(&ledger.store, "Ana", dec!(30));

    let response = app
        .clone()
        .oneshot(get(&format!("/api/v1/transactions/{}", Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error_code"], "transaction_not_found");

    let response = app
        .oneshot(post_json(
            "/api/v1/transactions/transfer",
            json!({"debitedAccountId": wallet.id, "creditedAccountId": Uuid::new_v4(), "amount": "1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error_code"], "wallet_not_found");
    assert!(body["error"].as_str().unwrap().starts_with("Credited wallet"));
}

#[tokio::test]
async fn test_store_failure_is_internal_error() {
    let (app, ledger) = setup_app().await;
    let wallet = open_wallet(&ledger.store, "Ana", dec!(30));
    ledger.store.set_commit_failure(true);

    let response = app
        .oneshot(post_json(
            "/api/v1/transactions/deposit-withdraw",
            json!({"walletId": wallet.id, "amount": "1", "type": "DEPOSIT"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error_code"], "store_error");
    assert_eq!(body["error"], "Internal server error");
}

#[tokio::test]
async fn test_correlation_id_echoed() {
    let (app, _) = setup_app().await;
    let correlation_id = Uuid::new_v4();

    let request = Request::builder()
        .uri("/api/v1/transactions")
        .header("x-correlation-id", correlation_id.to_string())
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(
        response.headers()["x-correlation-id"],
        correlation_id.to_string().as_str()
    );
}
