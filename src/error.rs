//! Application-level error types for the trikv server.

use crate::storage::StorageError;
use thiserror::Error;

/// Top-level application error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("file error: {0}")]
    FileError(#[from] std::io::Error),

    #[error("parse error: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: String, value: String },
}

/// Telemetry initialization errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("subscriber setup failed: {0}")]
    SubscriberInit(String),
}

/// Everything that can go wrong while serving one request.
///
/// Every variant ends up in a response envelope; none of them is fatal to
/// the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("method forbidden")]
    MethodNotSupported,

    #[error("{0}")]
    Decode(String),

    #[error("{0}")]
    Encode(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for RequestError {
    fn from(err: serde_json::Error) -> Self {
        RequestError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
