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
    InvalidBindAddress(String),

    #[error("Invalid memory connection entry '{0}', expected 'user:user'")]
    InvalidMemoryConnection(String),

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Invalid broker URL format")]
    InvalidBrokerUrl,

    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),

    #[error("Priority must be between 1 and 5, got {0}")]
    InvalidPriority(u8),

    #[error("Priority weights must sum to 100, got {0}")]
    InvalidPriorityWeights(u32),

    #[error("WebSocket path must start with '/'")]
    InvalidWebSocketPath,

    #[error("JWT secret must be at least {0} bytes")]
    WeakJwtSecret(usize),
}
