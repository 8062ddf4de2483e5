mod device_table;

pub use device_table::{DeviceTable, Item, ScanPage, SqliteDeviceTable, KEY_ATTRIBUTE};

use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid table name: {0:?}")]
    InvalidTableName(String),

    #[error("Stored item for key {0:?} is not a JSON object")]
    CorruptItem(String),

    #[error("Item is missing the deviceId key attribute")]
    MissingKey,
}

/// Database configuration
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:data/homedevices.db".to_string(),
            max_connections: 5,
        }
    }
}

/// Create and configure a SQLite connection pool
pub async fn create_pool(config: &DbConfig) -> Result<SqlitePool, DbError> {
    // Ensure the data directory exists
    if let Some(db_path) = config.url.strip_prefix("sqlite:") {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    DbError::Migration(format!("Failed to create database directory: {}", e))
                })?;
            }
        }
    }

    let url = if config.url.contains(":memory:") {
        config.url.clone()
    } else {
        format!("{}?mode=rwc", config.url)
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&url)
        .await?;

    Ok(pool)
}

/// Table names end up inside SQL text, so only plain identifiers are allowed.
pub fn validate_table_name(name: &str) -> Result<(), DbError> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(DbError::InvalidTableName(name.to_string()))
    }
}

/// Create the device table if it does not exist yet
pub async fn run_migrations(pool: &SqlitePool, table_name: &str) -> Result<(), DbError> {
    validate_table_name(table_name)?;

    let ddl = format!(
        "CREATE TABLE IF NOT EXISTS \"{table_name}\" (
            device_id TEXT PRIMARY KEY NOT NULL,
            item TEXT NOT NULL
        )"
    );
    sqlx::raw_sql(&ddl).execute(pool).await?;

    tracing::info!(table = %table_name, "Database migrations completed");
    Ok(())
}
