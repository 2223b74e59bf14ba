//! Twitter-specific error types.

use std::sync::Arc;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised while talking to the upstream Twitter API.
#[derive(Error, Debug)]
pub enum TwitterError {
    /// Network, DNS or timeout failure reported by the transport.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered with a non-success status.
    #[error("Twitter API error {status}: {body}")]
    Upstream {
        status: StatusCode,
        /// Response body, untouched.
        body: String,
    },

    /// A profile fetch failed; every caller joined on it sees the same source.
    #[error("profile fetch for user {id} failed: {source}")]
    CacheFailure {
        id: String,
        #[source]
        source: Arc<TwitterError>,
    },

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// OAuth signature generation failed
    #[error("OAuth error: {0}")]
    OAuth(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A background fetch task died before producing a result.
    #[error("task failed: {0}")]
    Task(String),
}

impl TwitterError {
    /// Whether this is a transport-level failure.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_))
    }

    /// Upstream HTTP status, when the failure carries one.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http(e) => e.status(),
            Self::Upstream { status, .. } => Some(*status),
            Self::CacheFailure { source, .. } => source.status(),
            _ => None,
        }
    }
}

/// Result type for Twitter operations.
pub type TwitterResult<T> = Result<T, TwitterError>;
