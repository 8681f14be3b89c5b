//! HTTP client abstraction for testability

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// User agent sent with every remote geocoding request.
pub const DEFAULT_USER_AGENT: &str = concat!("bearing/", env!("CARGO_PKG_VERSION"));

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Transport-level HTTP errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HttpError {
    #[error("Failed to create HTTP client: {0}")]
    Client(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Failed to read response: {0}")]
    Body(String),

    #[error("Request cancelled")]
    Cancelled,
}

/// Trait for asynchronous HTTP GET requests.
///
/// Implementations must check `cancel` before sending and between body
/// chunks, returning [`HttpError::Cancelled`] once it fires.
pub trait AsyncHttpClient: Send + Sync {
    /// Performs an HTTP GET request and returns the full response body.
    fn get(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Vec<u8>, HttpError>> + Send;
}

/// Async HTTP client implementation using reqwest.
#[derive(Clone)]
pub struct AsyncReqwestClient {
    client: reqwest::Client,
}

impl AsyncReqwestClient {
    /// Creates a client with the default timeout.
    pub fn new() -> Result<Self, HttpError> {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client with a custom timeout.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|e| HttpError::Client(e.to_string()))?;

        Ok(Self { client })
    }
}

impl AsyncHttpClient for AsyncReqwestClient {
    async fn get(&self, url: &str, cancel: &CancellationToken) -> Result<Vec<u8>, HttpError> {
        if cancel.is_cancelled() {
            return Err(HttpError::Cancelled);
        }

        trace!(url = url, "HTTP GET request starting");

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(HttpError::Cancelled),
            sent = self.client.get(url).send() => sent,
        };

        let mut response = match sent {
            Ok(resp) => {
                debug!(
                    url = url,
                    status = resp.status().as_u16(),
                    "HTTP response received"
                );
                resp
            }
            Err(e) => {
                warn!(
                    url = url,
                    error = %e,
                    is_connect = e.is_connect(),
                    is_timeout = e.is_timeout(),
                    "HTTP request failed"
                );
                return Err(HttpError::Request(e.to_string()));
            }
        };

        if !response.status().is_success() {
            warn!(
                url = url,
                status = response.status().as_u16(),
                "HTTP error status"
            );
            return Err(HttpError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let mut body = Vec::new();
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(url = url, read = body.len(), "HTTP body read cancelled");
                    return Err(HttpError::Cancelled);
                }
                chunk = response.chunk() => chunk,
            };

            match chunk {
                Ok(Some(bytes)) => body.extend_from_slice(&bytes),
                Ok(None) => break,
                Err(e) => {
                    warn!(url = url, error = %e, "Failed to read response body");
                    return Err(HttpError::Body(e.to_string()));
                }
            }
        }

        trace!(url = url, bytes = body.len(), "HTTP response body read");
        Ok(body)
    }
}
