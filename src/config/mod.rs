//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables using the
//! `config` and `dotenvy` crates. Variables use the `CHESS_SYNC` prefix and
//! nested values are separated by double underscores. Every section has
//! defaults, so an empty environment yields a runnable configuration.
//!
//! # Example
//!
//! ```no_run
//! use chess_sync::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod bots;
mod error;
mod server;
mod session;

pub use bots::{BotsConfig, EngineConfig};
pub use error::{ConfigError, ValidationError};
pub use server::{Environment, ServerConfig};
pub use session::SessionConfig;

use serde::Deserialize;

/// Root application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Relay server configuration (host, port, logging)
    #[serde(default)]
    pub server: ServerConfig,

    /// Session controller limits and defaults
    #[serde(default)]
    pub session: SessionConfig,

    /// Automated opponent engines
    #[serde(default)]
    pub bots: BotsConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `CHESS_SYNC` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    ///
    /// # Environment Variable Format
    ///
    /// - `CHESS_SYNC__SERVER__PORT=9000` -> `server.port = 9000`
    /// - `CHESS_SYNC__SESSION__BOT_MOVE_TIMEOUT_MS=3000`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("CHESS_SYNC")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.session.validate()?;
        self.bots.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
