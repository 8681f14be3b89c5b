//! Request descriptor: accuracy, cache, fallback and tracking policy.

use std::time::Duration;

use super::accuracy::Accuracy;
use super::error::LocationError;

/// Default time to wait for a single-shot fix before timing out.
pub const DEFAULT_FALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Default maximum age of a cached fix.
pub const DEFAULT_CACHE_EXPIRY: Duration = Duration::from_secs(60 * 60);

/// Default backend polling interval for recurring updates.
pub const DEFAULT_TRACKING_RATE: Duration = Duration::from_secs(20 * 60);

/// Default maximum silence between recurring deliveries.
pub const DEFAULT_TRACKING_FALLBACK: Duration = Duration::from_secs(30 * 60);

/// What to do when a single-shot request times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackMode {
    /// Report the timeout and nothing else.
    #[default]
    None,
    /// Report the timeout, then serve the last known fix (or a failure).
    UseCache,
}

/// Caller policy for one location request.
///
/// Built fluently and treated as immutable once handed to a task.
///
/// ```
/// use std::time::Duration;
/// use bearing::location::{Accuracy, FallbackMode, LocationRequest};
///
/// let request = LocationRequest::new()
///     .with_accuracy(Accuracy::High)
///     .with_cache(true, Duration::from_secs(300))
///     .with_fallback(FallbackMode::UseCache, Duration::from_secs(15));
/// assert!(request.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LocationRequest {
    /// Maximum acceptable error radius.
    pub accuracy: Accuracy,
    /// Behaviour when a single-shot request times out.
    pub fallback_mode: FallbackMode,
    /// Timeout for the first fix. Zero disables the timer.
    pub fallback_timeout: Duration,
    /// Whether a cached fix may answer the request.
    pub use_cache: bool,
    /// Cached fixes older than this are ignored.
    pub cache_expiry: Duration,
    /// Minimum movement in metres before a recurring fix is forwarded.
    /// `None` forwards every fix.
    pub tracking_displacement: Option<f64>,
    /// Requested backend polling interval for recurring updates.
    pub tracking_rate: Duration,
    /// Maximum silence before a recurring fix is forced through.
    pub tracking_fallback: Duration,
}

impl Default for LocationRequest {
    fn default() -> Self {
        Self {
            accuracy: Accuracy::Medium,
            fallback_mode: FallbackMode::None,
            fallback_timeout: DEFAULT_FALLBACK_TIMEOUT,
            use_cache: true,
            cache_expiry: DEFAULT_CACHE_EXPIRY,
            tracking_displacement: None,
            tracking_rate: DEFAULT_TRACKING_RATE,
            tracking_fallback: DEFAULT_TRACKING_FALLBACK,
        }
    }
}

impl LocationRequest {
    /// Create a request with default policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the accuracy tier.
    pub fn with_accuracy(mut self, accuracy: Accuracy) -> Self {
        self.accuracy = accuracy;
        self
    }

    /// Set whether to use a cached fix, and how old it may be.
    pub fn with_cache(mut self, use_cache: bool, expiry: Duration) -> Self {
        self.use_cache = use_cache;
        self.cache_expiry = expiry;
        self
    }

    /// Set the timeout fallback policy.
    pub fn with_fallback(mut self, mode: FallbackMode, timeout: Duration) -> Self {
        self.fallback_mode = mode;
        self.fallback_timeout = timeout;
        self
    }

    /// Set the recurring-update policy.
    ///
    /// A negative displacement disables the displacement filter.
    pub fn with_tracking(mut self, displacement_m: f64, rate: Duration, fallback: Duration) -> Self {
        self.tracking_displacement = (displacement_m >= 0.0).then_some(displacement_m);
        self.tracking_rate = rate;
        self.tracking_fallback = fallback;
        self
    }

    /// Whether the single-shot timeout timer should be armed.
    pub fn has_timeout(&self) -> bool {
        !self.fallback_timeout.is_zero()
    }

    /// Check the policy invariants that apply to every request.
    pub fn validate(&self) -> Result<(), LocationError> {
        if self.use_cache && self.cache_expiry.is_zero() {
            return Err(LocationError::InvalidRequest(
                "cache_expiry must be positive when the cache is enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Check the invariants for a recurring request.
    pub fn validate_tracking(&self) -> Result<(), LocationError> {
        self.validate()?;

        if self.tracking_rate.is_zero() {
            return Err(LocationError::InvalidRequest(
                "tracking_rate must be positive".to_string(),
            ));
        }
        if self.tracking_fallback.is_zero() {
            return Err(LocationError::InvalidRequest(
                "tracking_fallback must be positive".to_string(),
            ));
        }
        if let Some(d) = self.tracking_displacement {
            if !d.is_finite() || d < 0.0 {
                return Err(LocationError::InvalidRequest(format!(
                    "tracking_displacement must be a non-negative distance, got {}",
                    d
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let request = LocationRequest::new();
        assert_eq!(request.accuracy, Accuracy::Medium);
        assert_eq!(request.fallback_mode, FallbackMode::None);
        assert_eq!(request.fallback_timeout, Duration::from_secs(10));
        assert!(request.use_cache);
        assert_eq!(request.cache_expiry, Duration::from_secs(3600));
        assert_eq!(request.tracking_displacement, None);
        assert_eq!(request.tracking_rate, Duration::from_secs(1200));
        assert_eq!(request.tracking_fallback, Duration::from_secs(1800));
    }

    #[test]
    fn test_negative_displacement_disables_filter() {
        let request = LocationRequest::new().with_tracking(
            -1.0,
            Duration::from_secs(5),
            Duration::from_secs(60),
        );
        assert_eq!(request.tracking_displacement, None);

        let request = request.with_tracking(50.0, Duration::from_secs(5), Duration::from_secs(60));
        assert_eq!(request.tracking_displacement, Some(50.0));
    }

    #[test]
    fn test_zero_timeout_disables_timer() {
        let request = LocationRequest::new().with_fallback(FallbackMode::UseCache, Duration::ZERO);
        assert!(!request.has_timeout());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_zero_cache_expiry_rejected_only_when_cache_enabled() {
        let request = LocationRequest::new().with_cache(true, Duration::ZERO);
        assert!(matches!(
            request.validate(),
            Err(LocationError::InvalidRequest(_))
        ));

        let request = LocationRequest::new().with_cache(false, Duration::ZERO);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_tracking_validation() {
        let request =
            LocationRequest::new().with_tracking(10.0, Duration::ZERO, Duration::from_secs(60));
        assert!(request.validate_tracking().is_err());

        let request =
            LocationRequest::new().with_tracking(10.0, Duration::from_secs(1), Duration::ZERO);
        assert!(request.validate_tracking().is_err());

        let mut request = LocationRequest::new();
        request.tracking_displacement = Some(f64::NAN);
        assert!(request.validate_tracking().is_err());

        assert!(LocationRequest::new().validate_tracking().is_ok());
    }
}
