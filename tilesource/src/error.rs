//! Error types shared by the fetch, dedupe, dispatch and source layers.
//!
//! Every error is `Clone` because a single fetch result may be delivered to
//! many waiters (see [`crate::dedupe`]).

use thiserror::Error;

/// Errors that can occur while acquiring source metadata or tiles.
///
/// No layer in this crate retries on its own. Retry policy belongs to the
/// caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Fetch failed, or the server answered with a non-404 error status.
    #[error("network error for {url}: {message}")]
    Network {
        url: String,
        status: Option<u16>,
        message: String,
    },

    /// The server answered 404. Delivered like any other error but never
    /// recorded as resource timing.
    #[error("resource not found: {url}")]
    NotFound { url: String },

    /// Metadata or tile payload could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// The worker actor is gone or reported a failure.
    #[error("worker error: {0}")]
    Worker(String),

    /// The request was cancelled before it produced a result.
    #[error("request cancelled")]
    Cancelled,

    /// Tiles were requested before the source metadata resolved.
    #[error("source metadata is not loaded")]
    NotLoaded,
}

impl SourceError {
    /// Creates a network error without an HTTP status.
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            status: None,
            message: message.into(),
        }
    }

    /// Returns the HTTP status associated with this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Network { status, .. } => *status,
            Self::NotFound { .. } => Some(404),
            _ => None,
        }
    }

    /// Returns true for 404 responses.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if this error only reports a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}
