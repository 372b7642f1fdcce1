//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid bind address: {0}")]
    InvalidAddress(String),

    #[error("Bot move timeout must be between 1 and 60000 ms")]
    InvalidBotTimeout,

    #[error("Channel capacity must be positive")]
    InvalidCapacity,

    #[error("Default time control must have a positive initial budget")]
    InvalidTimeControl,

    #[error("Bot engine '{0}' has no command")]
    MissingEngineCommand(String),
}
