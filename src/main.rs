//! wallet_ledger - Wallet Ledger Service
//!
//! Executes deposits, withdrawals and transfers against PostgreSQL, publishes
//! a `transactions.created` event per commit and mails the wallet owners.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wallet_ledger::api::{self, AppState};
use wallet_ledger::bus::{self, BusSettings, EventBus};
use wallet_ledger::domain::{TransactionCreatedRef, TRANSACTIONS_CREATED_TOPIC};
use wallet_ledger::notification::{
    NotificationConsumer, Notifier, RetryPolicy, SmtpMailTransport, Templates,
};
use wallet_ledger::store::PgLedgerStore;
use wallet_ledger::{db, Config, LedgerEngine};

/// Initialize tracing/logging
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "wallet_ledger=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;
    init_tracing(config.is_production());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(environment = %config.environment, "Starting wallet ledger");
    tracing::info!("Connecting to database...");

    let pool = db::connect(&config.database_url, config.database_max_connections).await?;

    // Verify database schema
    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }
    tracing::info!("Database connected successfully");

    // Event bus
    let broker = bus::broker_from_addresses(&config.event_bus.brokers, &config.event_bus.client_id)?;
    let event_bus = Arc::new(
        EventBus::connect(
            broker,
            BusSettings {
                client_id: config.event_bus.client_id.clone(),
                lanes: config.event_bus.lanes,
            },
        )
        .await?,
    );

    let store = Arc::new(PgLedgerStore::new(pool.clone()));

    // Notification consumer
    let notifier = Arc::new(Notifier::new(
        Arc::new(SmtpMailTransport::new(&config.smtp)?),
        Templates::new(config.mail_utc_offset),
    ));
    let consumer = Arc::new(NotificationConsumer::new(
        store.clone(),
        notifier,
        RetryPolicy::default(),
    ));
    event_bus
        .subscribe::<TransactionCreatedRef>(
            TRANSACTIONS_CREATED_TOPIC,
            &config.event_bus.email_group(),
            consumer,
        )
        .await?;

    // HTTP server
    let engine = LedgerEngine::new(store, event_bus.clone());
    let app = api::build_router(AppState { engine });

    let served = serve(addr, app).await;
    if let Err(e) = &served {
        tracing::error!(error = %e, "Server stopped with an error");
    }

    // Cleanup runs on both paths: consumers, then producer, then database
    tracing::info!("Server shutting down...");
    if let Err(e) = event_bus.shutdown().await {
        tracing::error!(error = %e, "Event bus shutdown failed");
    }
    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    served
}

/// Bind and serve until a shutdown signal arrives
async fn serve(addr: SocketAddr, app: axum::Router) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
