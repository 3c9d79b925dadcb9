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
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid listen address: {0}")]
    InvalidAddress(String),

    #[error("Shutdown delay exceeds maximum allowed (60s)")]
    ShutdownDelayTooLong,

    #[error("Storage root must not be empty")]
    EmptyStorageRoot,

    #[error("Invalid store file extension '{0}'")]
    InvalidFileExtension(String),

    #[error("Handshake timeout must be between 1 and 3600 seconds")]
    InvalidHandshakeTimeout,

    #[error("Outbound buffer must be between 1 and 65536 messages")]
    InvalidOutboundBuffer,
}
