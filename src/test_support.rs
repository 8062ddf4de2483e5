use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::AppConfig;
use crate::db::{create_pool, run_migrations, DbConfig, SqliteDeviceTable};
use crate::devices::DevicesService;
use crate::AppState;

/// App state over a fresh in-memory table, plus the pool behind it
pub async fn test_state_with_pool(config: AppConfig) -> (AppState, SqlitePool) {
    let db_config = DbConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
    };
    let pool = create_pool(&db_config).await.unwrap();
    run_migrations(&pool, &config.table_name).await.unwrap();
    let table = SqliteDeviceTable::new(pool.clone(), config.table_name.clone()).unwrap();

    let state = AppState {
        devices_service: Arc::new(DevicesService::new(
            Arc::new(table),
            config.devices_options(),
        )),
        config: Arc::new(config),
    };

    (state, pool)
}

pub async fn test_state() -> AppState {
    test_state_with_pool(AppConfig::default()).await.0
}
