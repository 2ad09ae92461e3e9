//! Application configuration.
//!
//! Loaded once at startup, in order of precedence (last wins):
//! 1. Default values in code
//! 2. An optional `stockbook.toml` in the working directory
//! 3. Environment variables with the `STOCKBOOK__` prefix
//!    (e.g. `STOCKBOOK__SERVER__PORT=9000`, `STOCKBOOK__LEDGER__MAX_RETRIES=5`)
//!
//! `main` reads a `.env` file first, so its entries count as environment.

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

use stockbook_infra::LedgerConfig;
use stockbook_observability::LogSettings;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub log: LogSettings,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL URL. Without it the ledger runs in memory.
    #[serde(default)]
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

impl AppConfig {
    /// Load configuration from `stockbook.toml` and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::defaults()?
            .add_source(File::with_name("stockbook").required(false))
            .add_source(
                Environment::with_prefix("STOCKBOOK")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Builder pre-filled with the in-code defaults.
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("database.max_connections", 10)?
            .set_default("log.format", "json")?
            .set_default("log.filter", "info")?
            .set_default("ledger.max_retries", 3)?
            .set_default("ledger.purge_timeout_secs", 600)?
            .set_default("ledger.payment.allow_reopen_paid", true)
    }
}
