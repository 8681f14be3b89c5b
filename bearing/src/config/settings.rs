//! Settings structs, one per INI section.

use std::time::Duration;

use crate::geocoding::{
    AsyncHttpClient, EmptyResultPolicy, GeocodingTask, DEFAULT_LOCALE, DEFAULT_MAX_RESULTS,
};
use crate::location::{
    Accuracy, FallbackMode, LocationRequest, ManagedBackendConfig, DEFAULT_CACHE_EXPIRY,
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_FALLBACK_TIMEOUT, DEFAULT_TRACKING_FALLBACK,
    DEFAULT_TRACKING_RATE,
};

/// Complete user configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub location: LocationSettings,
    pub backend: BackendSettings,
    pub geocoding: GeocodingSettings,
}

/// `[location]` section: default request policy.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationSettings {
    pub accuracy: Accuracy,
    pub use_cache: bool,
    pub cache_expiry: Duration,
    pub fallback: FallbackMode,
    pub fallback_timeout: Duration,
    /// Metres; `None` disables the displacement filter.
    pub tracking_displacement: Option<f64>,
    pub tracking_rate: Duration,
    pub tracking_fallback: Duration,
}

impl Default for LocationSettings {
    fn default() -> Self {
        Self {
            accuracy: Accuracy::Medium,
            use_cache: true,
            cache_expiry: DEFAULT_CACHE_EXPIRY,
            fallback: FallbackMode::None,
            fallback_timeout: DEFAULT_FALLBACK_TIMEOUT,
            tracking_displacement: None,
            tracking_rate: DEFAULT_TRACKING_RATE,
            tracking_fallback: DEFAULT_TRACKING_FALLBACK,
        }
    }
}

/// `[backend]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendSettings {
    pub connect_timeout: Duration,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// `[geocoding]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodingSettings {
    pub api_key: Option<String>,
    pub language: String,
    pub max_results: usize,
    pub fallback_on_empty: EmptyResultPolicy,
}

impl Default for GeocodingSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            language: DEFAULT_LOCALE.to_string(),
            max_results: DEFAULT_MAX_RESULTS,
            fallback_on_empty: EmptyResultPolicy::FallBack,
        }
    }
}

impl GeocodingSettings {
    /// Apply result count, language and empty-result policy to a task.
    pub fn configure<C: AsyncHttpClient>(&self, task: GeocodingTask<C>) -> GeocodingTask<C> {
        task.results(self.max_results)
            .locale(self.language.clone())
            .on_empty(self.fallback_on_empty)
    }
}

impl ConfigFile {
    /// Request policy built from the `[location]` section.
    pub fn location_request(&self) -> LocationRequest {
        let loc = &self.location;
        LocationRequest::new()
            .with_accuracy(loc.accuracy)
            .with_cache(loc.use_cache, loc.cache_expiry)
            .with_fallback(loc.fallback, loc.fallback_timeout)
            .with_tracking(
                loc.tracking_displacement.unwrap_or(-1.0),
                loc.tracking_rate,
                loc.tracking_fallback,
            )
    }

    /// Managed backend settings built from the `[backend]` section.
    pub fn managed_config(&self) -> ManagedBackendConfig {
        ManagedBackendConfig {
            connect_timeout: self.backend.connect_timeout,
        }
    }
}
