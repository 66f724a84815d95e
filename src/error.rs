//! Error types for the request lifecycle client.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using the sortie error type.
pub type Result<T> = std::result::Result<T, SortieError>;

/// Main error type for the request lifecycle client.
#[derive(Error, Debug)]
pub enum SortieError {
    /// The request was superseded by a newer one or explicitly cancelled.
    #[error("Request cancelled")]
    Cancelled,

    /// No credential was available for a request that requires one
    #[error("Not authenticated")]
    Unauthenticated,

    /// The server answered with a non-2xx status
    #[error("{message}")]
    Transport { status: u16, message: String },

    /// Network-level failure (connection refused, DNS, timeout, ...)
    #[error("Network error: {0}")]
    Network(String),

    /// A 2xx response whose body could not be decoded as JSON
    #[error("Failed to decode response body: {0}")]
    Decode(String),

    /// Malformed input detected before the request was sent (bad URL, unknown method, ...)
    #[error("Failed to build request: {0}")]
    Construction(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General error from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SortieError {
    /// Build a transport error from a status code, using the fetch-style
    /// `Error <status>: <reason>` message.
    pub fn from_status(status: reqwest::StatusCode) -> Self {
        SortieError::Transport {
            status: status.as_u16(),
            message: format!(
                "Error {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown Status")
            ),
        }
    }

    /// Whether this error represents a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SortieError::Cancelled)
    }
}

impl From<reqwest::Error> for SortieError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            SortieError::Construction(e.to_string())
        } else if e.is_decode() {
            SortieError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            SortieError::from_status(status)
        } else {
            SortieError::Network(e.to_string())
        }
    }
}

/// Category of a failure recorded in [`crate::RequestState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    Network,
    Unauthenticated,
    Decode,
    Other,
}

/// Cloneable snapshot of a failure, as stored in request state.
///
/// [`SortieError`] wraps non-cloneable sources (`serde_json::Error`,
/// `anyhow::Error`), so the state keeps this flattened form instead: the kind,
/// the HTTP status when there was one, and the rendered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub message: String,
}

impl ErrorInfo {
    /// Status code for transport errors, `None` otherwise.
    pub fn status(&self) -> Option<u16> {
        self.status
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<&SortieError> for ErrorInfo {
    fn from(error: &SortieError) -> Self {
        let (kind, status) = match error {
            SortieError::Transport { status, .. } => (ErrorKind::Transport, Some(*status)),
            SortieError::Network(_) => (ErrorKind::Network, None),
            SortieError::Unauthenticated => (ErrorKind::Unauthenticated, None),
            SortieError::Decode(_) | SortieError::Serialization(_) => (ErrorKind::Decode, None),
            SortieError::Cancelled | SortieError::Construction(_) | SortieError::Other(_) => {
                (ErrorKind::Other, None)
            }
        };
        ErrorInfo {
            kind,
            status,
            message: error.to_string(),
        }
    }
}
