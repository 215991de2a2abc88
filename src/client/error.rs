//! Client-side error taxonomy

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the client core
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The backend rejected the request as invalid (400)
    #[error("invalid request: {0}")]
    Validation(String),

    /// The backend or its provider failed (non-2xx, malformed body, empty result)
    #[error("server error ({status}): {message}")]
    Upstream { status: u16, message: String },

    /// Transport-level failure reaching the backend
    #[error("network error: {0}")]
    Network(String),

    /// The request did not complete in time
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Microphone access denied
    #[error("microphone access denied: {0}")]
    Permission(String),

    /// Capture requested while offline, unreachable or unconfigured
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A turn is already in progress
    #[error("a turn is already in progress")]
    Busy,

    /// Stop requested while not capturing
    #[error("not capturing")]
    NotCapturing,

    /// Audio capture or encoding failed
    #[error("audio error: {0}")]
    Audio(String),

    /// Settings could not be read or written
    #[error("settings storage error: {0}")]
    Storage(String),
}

impl ClientError {
    /// Whether this failure means the backend should be treated as unreachable
    #[must_use]
    pub const fn affects_availability(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Upstream {
                status: e.status().map_or(200, |s| s.as_u16()),
                message: format!("invalid response body: {e}"),
            }
        } else {
            Self::Network(e.to_string())
        }
    }
}
