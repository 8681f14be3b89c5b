//! Geocoding error types.

use thiserror::Error;

use super::http::HttpError;

/// Errors from address resolution.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeocodeError {
    /// Transport failure talking to the remote service.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// The remote response was not the expected JSON shape.
    #[error("Malformed geocoding response: {0}")]
    Json(String),

    /// The remote service answered with an error status.
    #[error("Geocoding service returned {status}: {message}")]
    Service { status: String, message: String },

    /// The query cannot be sent.
    #[error("Invalid geocoding query: {0}")]
    InvalidQuery(String),

    /// The native resolver failed.
    #[error("Native geocoder failed: {0}")]
    NativeFailed(String),

    /// No native resolver on this host and no remote resolver configured.
    #[error("No geocoder available")]
    NoResolver,

    /// The task was cancelled.
    #[error("Geocoding cancelled")]
    Cancelled,

    /// The task was started outside a Tokio runtime.
    #[error("Geocoding tasks must be started from within a Tokio runtime")]
    NoRuntime,
}

impl From<serde_json::Error> for GeocodeError {
    fn from(e: serde_json::Error) -> Self {
        GeocodeError::Json(e.to_string())
    }
}
