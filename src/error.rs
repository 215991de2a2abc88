//! Error types for the EuAiTalk gateway

use thiserror::Error;

use crate::config::MissingSettings;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Required deployment settings are missing or placeholders
    #[error(transparent)]
    Settings(#[from] MissingSettings),

    /// Caller input is missing or malformed
    #[error("validation error: {0}")]
    Validation(String),

    /// The speech or chat provider failed
    #[error("upstream error: {message}")]
    Upstream {
        /// HTTP status returned by the provider, if a response arrived
        status: Option<u16>,
        message: String,
    },

    /// Audio error
    #[error("audio error: {0}")]
    Audio(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Build an upstream error without a response status (transport failure)
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            status: None,
            message: message.into(),
        }
    }
}
