//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables with the
//! `config` and `dotenvy` crates. Variables use the `FEED_FANOUT` prefix and
//! `__` between nested keys.
//!
//! # Example
//!
//! ```no_run
//! use feed_fanout::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod auth;
mod broker;
mod database;
mod error;
mod fanout;
mod hub;
mod server;
mod worker;

pub use auth::AuthConfig;
pub use broker::{BrokerBackend, BrokerConfig};
pub use database::{DatabaseConfig, StorageBackend};
pub use error::{ConfigError, ValidationError};
pub use fanout::{FanoutConfig, PriorityPolicy};
pub use hub::HubConfig;
pub use server::{Environment, LogFormat, ServerConfig, ServiceRole};
pub use worker::WorkerConfig;

use serde::Deserialize;

/// Env var prefix shared by every setting.
pub const ENV_PREFIX: &str = "FEED_FANOUT";

/// Root application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub broker: BrokerConfig,

    #[serde(default)]
    pub fanout: FanoutConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub hub: HubConfig,

    /// Bearer token validation; the only section without defaults
    pub auth: AuthConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// 1. Loads `.env` if present (development)
    /// 2. Reads variables with the `FEED_FANOUT` prefix
    /// 3. Uses `__` to separate nested values
    ///
    /// - `FEED_FANOUT__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `FEED_FANOUT__BROKER__URL=amqp://...` -> `broker.url = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or values
    /// cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix(ENV_PREFIX)
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Semantic validation of every section.
    ///
    /// # Errors
    ///
    /// Returns the first `ValidationError` found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.broker.validate()?;
        self.fanout.validate()?;
        self.worker.validate()?;
        self.hub.validate()?;
        self.auth.validate()?;
        Ok(())
    }

    /// Load and validate in one step.
    pub fn load_validated() -> Result<Self, ConfigError> {
        let config = Self::load()?;
        config.validate()?;
        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }

    /// Everything in process memory; used by tests and local runs.
    pub fn in_memory(jwt_secret: impl Into<String>) -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig {
                backend: StorageBackend::Memory,
                ..Default::default()
            },
            broker: BrokerConfig {
                backend: BrokerBackend::Memory,
                ..Default::default()
            },
            fanout: FanoutConfig::default(),
            worker: WorkerConfig::default(),
            hub: HubConfig::default(),
            auth: AuthConfig::new(jwt_secret),
        }
    }
}
