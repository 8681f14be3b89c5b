//! Error types for location acquisition.

use thiserror::Error;

/// Errors raised to the caller when building or starting a location task.
///
/// Runtime backend problems never surface here; they arrive as
/// [`LocationEvent::Failure`](super::LocationEvent::Failure).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocationError {
    /// Neither the managed service nor OS location services are available.
    #[error("No location backend available on this host")]
    NoBackendAvailable,

    /// The request descriptor violates a policy invariant.
    #[error("Invalid location request: {0}")]
    InvalidRequest(String),

    /// The task was started outside a Tokio runtime.
    #[error("Location tasks must be started from within a Tokio runtime")]
    NoRuntime,
}

/// Errors reported by a managed location service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The connection attempt failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The connection attempt did not finish in time.
    #[error("Connection timed out after {0}ms")]
    ConnectTimeout(u64),

    /// The service rejected an update registration.
    #[error("Registration rejected: {0}")]
    RegistrationRejected(String),
}

/// Errors reported by the OS location manager.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ManagerError {
    /// The requested source exists but is turned off.
    #[error("Location source '{0}' is disabled")]
    SourceDisabled(String),

    /// No source matches the requested criteria.
    #[error("No location source matches {0}")]
    NoMatchingSource(String),

    /// The platform threw while registering the listener.
    #[error("Registration failed: {0}")]
    RegistrationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_error_display() {
        let err = LocationError::InvalidRequest("tracking_rate must be positive".to_string());
        assert!(err.to_string().contains("Invalid location request"));
        assert!(err.to_string().contains("tracking_rate"));
    }

    #[test]
    fn test_service_error_display() {
        let err = ServiceError::ConnectTimeout(30_000);
        assert_eq!(err.to_string(), "Connection timed out after 30000ms");
    }
}
