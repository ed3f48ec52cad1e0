//! # Refund Desk
//!
//! Standalone Axum service for the refund-request lifecycle of a
//! point-of-sale back office.
//!
//! ## Architecture
//!
//! - Axum handles HTTP routing and request/response lifecycle
//! - SQLx manages the refund tables, the audit log and the settings table
//! - Every transition runs in one transaction holding the refund's row lock
//! - `REFUND_STORE=memory` swaps Postgres for the in-process store (local demos)

use std::sync::Arc;

use tracing::info;

use refund_desk::config::{AppConfig, StoreKind};
use refund_desk::service::RefundService;
use refund_desk::settings::{PgSettingsProvider, SettingsProvider, StaticSettings};
use refund_desk::store::{InMemoryRefundStore, PgRefundStore, RefundStore};
use refund_desk::{create_app, db};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "refund_desk=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting refund desk");

    let config = AppConfig::from_env()?;

    let (store, settings): (Arc<dyn RefundStore>, Arc<dyn SettingsProvider>) = match config.store {
        StoreKind::Postgres => {
            let pool = db::connect(&config).await?;
            (
                Arc::new(PgRefundStore::new(pool.clone(), config.lock_timeout)),
                Arc::new(PgSettingsProvider::new(pool, config.default_policy.clone())),
            )
        }
        StoreKind::Memory => {
            info!("Using in-memory refund store; data is lost on exit");
            (
                Arc::new(InMemoryRefundStore::new(config.lock_timeout)),
                Arc::new(StaticSettings::new(config.default_policy.clone())),
            )
        }
    };

    let app = create_app(Arc::new(RefundService::new(store, settings)));

    // Bind and serve
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
