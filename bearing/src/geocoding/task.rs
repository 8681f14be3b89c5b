//! Address resolution task.
//!
//! Tries the native geocoder first and falls back to the remote service
//! when the native attempt fails or, depending on [`EmptyResultPolicy`],
//! comes back empty.
//!
//! ```text
//! native present? ──no──────────────────────────┐
//!      │ yes                                    ▼
//!  classify ──Found──► done          remote configured? ──no──► NoResolver
//!      │                                        │ yes
//!      ├──Empty + Accept──► done (no results)   ▼
//!      └──Empty + FallBack / Unavailable ──► remote ──► done
//! ```

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::address::Address;
use super::error::GeocodeError;
use super::http::{AsyncHttpClient, AsyncReqwestClient};
use super::native::{needs_remote, EmptyResultPolicy, NativeGeocoder, Resolution};
use super::remote::RemoteGeocoder;

/// Default cap on returned addresses.
pub const DEFAULT_MAX_RESULTS: usize = 10;

/// Default language tag.
pub const DEFAULT_LOCALE: &str = "en";

/// What to resolve.
#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeQuery {
    /// Free-text place or address.
    Forward(String),
    /// Coordinate pair.
    Reverse { latitude: f64, longitude: f64 },
}

impl GeocodeQuery {
    /// Reject blank queries and out-of-range coordinates.
    pub fn validate(&self) -> Result<(), GeocodeError> {
        match self {
            GeocodeQuery::Forward(query) if query.trim().is_empty() => {
                Err(GeocodeError::InvalidQuery("query is empty".to_string()))
            }
            GeocodeQuery::Reverse {
                latitude,
                longitude,
            } if !(-90.0..=90.0).contains(latitude) || !(-180.0..=180.0).contains(longitude) => {
                Err(GeocodeError::InvalidQuery(format!(
                    "coordinates out of range: {},{}",
                    latitude, longitude
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Forward or reverse geocoding request.
pub struct GeocodingTask<C: AsyncHttpClient = AsyncReqwestClient> {
    query: GeocodeQuery,
    native: Option<Arc<dyn NativeGeocoder>>,
    remote: Option<RemoteGeocoder<C>>,
    max_results: usize,
    locale: String,
    on_empty: EmptyResultPolicy,
}

impl<C: AsyncHttpClient> GeocodingTask<C> {
    fn with_query(query: GeocodeQuery) -> Self {
        Self {
            query,
            native: None,
            remote: None,
            max_results: DEFAULT_MAX_RESULTS,
            locale: DEFAULT_LOCALE.to_string(),
            on_empty: EmptyResultPolicy::default(),
        }
    }

    /// Resolve a free-text query to addresses.
    pub fn forward(query: impl Into<String>) -> Self {
        Self::with_query(GeocodeQuery::Forward(query.into()))
    }

    /// Resolve a coordinate pair to addresses.
    pub fn reverse(latitude: f64, longitude: f64) -> Self {
        Self::with_query(GeocodeQuery::Reverse {
            latitude,
            longitude,
        })
    }

    pub fn native(mut self, geocoder: Arc<dyn NativeGeocoder>) -> Self {
        self.native = Some(geocoder);
        self
    }

    pub fn remote(mut self, geocoder: RemoteGeocoder<C>) -> Self {
        self.remote = Some(geocoder);
        self
    }

    /// Cap the number of addresses returned.
    pub fn results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Language tag for results.
    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// How an empty native result is treated.
    pub fn on_empty(mut self, policy: EmptyResultPolicy) -> Self {
        self.on_empty = policy;
        self
    }

    pub fn query(&self) -> &GeocodeQuery {
        &self.query
    }

    async fn resolve_native(&self) -> Resolution {
        let Some(native) = self.native.as_ref().filter(|n| n.is_present()) else {
            return Resolution::Unavailable;
        };

        let native = Arc::clone(native);
        let query = self.query.clone();
        let max_results = self.max_results;
        let locale = self.locale.clone();

        let joined = tokio::task::spawn_blocking(move || match query {
            GeocodeQuery::Forward(text) => native.from_location_name(&text, max_results, &locale),
            GeocodeQuery::Reverse {
                latitude,
                longitude,
            } => native.from_location(latitude, longitude, max_results, &locale),
        })
        .await;

        let result = joined.unwrap_or_else(|e| Err(GeocodeError::NativeFailed(e.to_string())));
        if let Err(e) = &result {
            warn!(error = %e, "Native geocoding failed");
        }
        Resolution::classify(result)
    }

    /// Run the resolution on the current task.
    pub async fn resolve(&self, cancel: &CancellationToken) -> Result<Vec<Address>, GeocodeError> {
        self.query.validate()?;
        if cancel.is_cancelled() {
            return Err(GeocodeError::Cancelled);
        }

        let resolution = self.resolve_native().await;
        if cancel.is_cancelled() {
            return Err(GeocodeError::Cancelled);
        }

        if !needs_remote(&resolution, self.on_empty) {
            debug!(query = ?self.query, "Resolved natively");
            return Ok(match resolution {
                Resolution::Found(mut addresses) => {
                    addresses.truncate(self.max_results);
                    addresses
                }
                _ => Vec::new(),
            });
        }

        let Some(remote) = &self.remote else {
            return match resolution {
                Resolution::Empty => Ok(Vec::new()),
                _ => Err(GeocodeError::NoResolver),
            };
        };

        debug!(query = ?self.query, native = ?resolution, "Falling back to remote geocoder");
        match &self.query {
            GeocodeQuery::Forward(text) => {
                remote
                    .forward(text, self.max_results, &self.locale, cancel)
                    .await
            }
            GeocodeQuery::Reverse {
                latitude,
                longitude,
            } => {
                remote
                    .reverse(*latitude, *longitude, self.max_results, &self.locale, cancel)
                    .await
            }
        }
    }
}

impl<C: AsyncHttpClient + 'static> GeocodingTask<C> {
    /// Run the task in the background.
    ///
    /// A cancelled task never yields an outcome.
    pub fn start(self) -> Result<GeocodingHandle, GeocodeError> {
        let runtime = Handle::try_current().map_err(|_| GeocodeError::NoRuntime)?;
        let cancellation = CancellationToken::new();
        let (tx, rx) = oneshot::channel();

        info!(query = ?self.query, "Geocoding started");

        let token = cancellation.clone();
        runtime.spawn(async move {
            let result = self.resolve(&token).await;
            if token.is_cancelled() {
                debug!("Geocoding cancelled, discarding outcome");
                return;
            }
            let _ = tx.send(result);
        });

        Ok(GeocodingHandle {
            cancellation,
            outcome: rx,
        })
    }
}

/// Handle to a running geocoding task.
pub struct GeocodingHandle {
    cancellation: CancellationToken,
    outcome: oneshot::Receiver<Result<Vec<Address>, GeocodeError>>,
}

impl GeocodingHandle {
    /// Request cancellation. In-flight reads stop at the next chunk.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Token that cancels this task, for use from elsewhere.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Wait for the result. `None` if the task was cancelled.
    pub async fn outcome(self) -> Option<Result<Vec<Address>, GeocodeError>> {
        self.outcome.await.ok()
    }
}
