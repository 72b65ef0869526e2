//! Error types for Stash.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Lifecycle errors
    #[error("Install failed for {partition} while fetching {url}: {reason}")]
    InstallFailed {
        partition: String,
        url: String,
        reason: String,
    },

    #[error("Invalid lifecycle phase: expected {expected}, found {actual}")]
    InvalidPhase { expected: String, actual: String },

    // Serving errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Offline and no cached fallback for {0}")]
    Offline(String),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Compression error: {0}")]
    Compression(String),

    // Input errors
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Infrastructure errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::InvalidUrl(err.to_string())
    }
}
