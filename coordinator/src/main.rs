//! Wallet Service Binary
//!
//! Serves wallet setup, transactions and history over HTTP.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wallet_coordinator::{router, AppState, ServiceConfig, TransactionCoordinator};
use wallet_ledger::{MemoryStorage, PgStorage, SharedStorage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = ServiceConfig::from_env();

    init_tracing(&config);

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    info!("Starting wallet service");

    let storage = open_storage(&config).await?;
    info!(backend = storage.backend(), "Storage ready");

    let coordinator = Arc::new(TransactionCoordinator::new(config.clone(), storage));
    coordinator.start().await?;

    let state = Arc::new(AppState::new(coordinator.clone(), config.query_config.clone()));
    let app = router(state);

    let addr = format!("{}:{}", config.listen_addr, config.listen_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(listen_addr = %addr, "Wallet service running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = coordinator.stop().await {
        error!(error = %e, "Error during shutdown");
    }

    info!("Wallet service shutdown complete");
    Ok(())
}

fn init_tracing(config: &ServiceConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    let registry = tracing_subscriber::registry().with(filter);
    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn open_storage(config: &ServiceConfig) -> anyhow::Result<SharedStorage> {
    match &config.database_url {
        Some(url) => {
            let storage = PgStorage::connect(url, config.db_max_connections)
                .await
                .context("failed to connect to PostgreSQL")?;
            storage.migrate().await.context("failed to apply schema")?;
            Ok(Arc::new(storage))
        }
        None => {
            info!("DATABASE_URL not set, using in-memory storage");
            Ok(Arc::new(MemoryStorage::new()))
        }
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining requests");
}
