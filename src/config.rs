use config::{Case, Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::db::validate_table_name;
use crate::devices::DevicesOptions;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database URL (SQLite connection string)
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Name of the table holding device records
    #[serde(default = "default_table_name")]
    pub table_name: String,

    /// Page size for device listings when the caller gives no limit
    #[serde(default = "default_page_limit")]
    pub default_page_limit: u32,

    /// Return 404 when updating a device that does not exist instead of creating it
    #[serde(default)]
    pub strict_updates: bool,

    /// Include raw error text in responses for unclassified failures
    #[serde(default = "default_true")]
    pub expose_error_details: bool,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database_url: default_database_url(),
            table_name: default_table_name(),
            default_page_limit: default_page_limit(),
            strict_updates: false,
            expose_error_details: true,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_database_url() -> String {
    "sqlite:data/homedevices.db".to_string()
}

fn default_table_name() -> String {
    "SmartHomeDevices".to_string()
}

fn default_page_limit() -> u32 {
    100
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let config = Config::builder()
            // Start with default values
            .set_default("host", default_host())?
            .set_default("port", default_port())?
            .set_default("table_name", default_table_name())?
            // Load from config file if present
            .add_source(File::with_name("config").required(false))
            .add_source(File::with_name("config.local").required(false))
            // Override with environment variables (prefixed with HOMEDEVICES_)
            .add_source(
                Environment::with_prefix("HOMEDEVICES")
                    .prefix_separator("_")
                    .separator("__")
                    .convert_case(Case::Snake)
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_table_name(&self.table_name).map_err(|e| ConfigError::Message(e.to_string()))?;

        if self.default_page_limit == 0 {
            return Err(ConfigError::Message(
                "default_page_limit must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn devices_options(&self) -> DevicesOptions {
        DevicesOptions {
            default_page_limit: self.default_page_limit,
            strict_updates: self.strict_updates,
        }
    }
}
