// =============================================================================
// Per-market futures trading engine — Main Entry Point
// =============================================================================

mod api;
mod config;
mod engine;
mod error;
mod exchange;
mod model;
mod notifier;
mod registry;
mod store;
mod worker_group;

use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::engine::LifecycleController;
use crate::exchange::KrakenDemoClient;
use crate::notifier::TelegramNotifier;
use crate::registry::{ConnectionRegistry, TradeRegistry};
use crate::store::PgOrderStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("starting up");

    let config = Config::load().unwrap_or_else(|e| {
        error!(error = %e, "missing configuration, aborting");
        std::process::exit(1);
    });

    let trade_registry = Arc::new(TradeRegistry::new());
    let conn_registry = Arc::new(ConnectionRegistry::new());
    let exchange = Arc::new(KrakenDemoClient::new(
        config.api_public.clone(),
        config.api_private.clone(),
    ));
    let store = Arc::new(PgOrderStore::connect(&config.dsn).await?);
    let notifier = Arc::new(TelegramNotifier::new(
        config.tg_bot_url.clone(),
        config.tg_chat_id,
    ));

    let controller = Arc::new(LifecycleController::new(
        trade_registry,
        conn_registry,
        exchange,
        store,
        notifier,
    ));

    let app = api::rest::router(controller.clone());
    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "control plane listening");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "control plane server failed");
        }
    });

    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received — stopping all markets");

    let shutdown = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        controller.stop_all(),
    )
    .await;
    match shutdown {
        Ok(results) => info!(count = results.len(), "all markets stopped"),
        Err(_) => warn!("stop_all did not complete within the shutdown deadline"),
    }

    server.abort();
    info!("shut down complete");
    Ok(())
}
