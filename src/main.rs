mod config;
mod db;
mod devices;
mod error;
mod gateway;
mod openapi;
mod routes;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;
use crate::db::{create_pool, run_migrations, DbConfig, SqliteDeviceTable};
use crate::devices::DevicesService;

#[derive(Clone)]
pub struct AppState {
    pub devices_service: Arc<DevicesService>,
    pub config: Arc<AppConfig>,
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl+c");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
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

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "homedevices=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = AppConfig::load()?;
    tracing::info!(table = %config.table_name, "Configuration loaded successfully");

    // One pool per process, handed to every handler through the app state
    let pool = create_pool(&DbConfig {
        url: config.database_url.clone(),
        ..Default::default()
    })
    .await?;
    run_migrations(&pool, &config.table_name).await?;

    let table = SqliteDeviceTable::new(pool, config.table_name.clone())?;
    let devices_service = Arc::new(DevicesService::new(
        Arc::new(table),
        config.devices_options(),
    ));

    match devices_service.count().await {
        Ok(count) => tracing::info!(count, "Devices service initialized"),
        Err(e) => tracing::warn!(error = %e, "Could not count stored devices"),
    }

    // Create shared application state
    let state = AppState {
        devices_service,
        config: Arc::new(config.clone()),
    };

    let app = routes::build_router(state);

    // Start server with graceful shutdown
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}
