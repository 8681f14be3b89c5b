//! Recurring-update filter.
//!
//! Decides which raw backend fixes reach a recurring caller:
//!
//! ```text
//! first fix                          → forward
//! t - last_forwarded >= fallback     → forward (forced refresh)
//! distance(last_forwarded) > min     → forward
//! otherwise                          → drop
//! ```
//!
//! This caps the silence between deliveries at the tracking fallback while
//! suppressing jitter below the displacement threshold.

use std::time::Duration;

use tokio::time::Instant;

use super::fix::Fix;
use super::request::LocationRequest;

/// Per-registration gate for recurring fixes.
#[derive(Debug, Clone)]
pub struct RecurringFilter {
    displacement_m: Option<f64>,
    fallback: Duration,
    last_fix: Option<Fix>,
    last_at: Option<Instant>,
}

impl RecurringFilter {
    /// Create a filter with explicit thresholds.
    pub fn new(displacement_m: Option<f64>, fallback: Duration) -> Self {
        Self {
            displacement_m,
            fallback,
            last_fix: None,
            last_at: None,
        }
    }

    /// Create a filter from a request's tracking policy.
    pub fn from_request(request: &LocationRequest) -> Self {
        Self::new(request.tracking_displacement, request.tracking_fallback)
    }

    /// Offer a raw fix received at `at`. Returns true if it should be
    /// forwarded; forwarded fixes become the new reference point.
    pub fn offer(&mut self, fix: &Fix, at: Instant) -> bool {
        let forced = match self.last_at {
            None => true,
            Some(last) => at.saturating_duration_since(last) >= self.fallback,
        };

        let moved = match (self.displacement_m, &self.last_fix) {
            (Some(min), Some(last)) => fix.distance_to(last) > min,
            _ => false,
        };

        if forced || moved {
            self.last_fix = Some(fix.clone());
            self.last_at = Some(at);
            return true;
        }

        false
    }

    /// The last forwarded fix, if any.
    pub fn last_forwarded(&self) -> Option<&Fix> {
        self.last_fix.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::FixSource;

    /// Metres per degree of latitude for the haversine radius used by `Fix`.
    const M_PER_DEG_LAT: f64 = 111_194.93;

    fn fix_at_north(metres: f64) -> Fix {
        Fix::new(48.0 + metres / M_PER_DEG_LAT, 11.0, 5.0, FixSource::Gps)
    }

    #[test]
    fn test_first_fix_always_forwarded() {
        let mut filter = RecurringFilter::new(Some(1000.0), Duration::from_secs(3600));
        assert!(filter.offer(&fix_at_north(0.0), Instant::now()));
    }

    #[test]
    fn test_reference_sequence() {
        let mut filter = RecurringFilter::new(Some(50.0), Duration::from_secs(60));
        let t0 = Instant::now();

        // t=0: first fix
        assert!(filter.offer(&fix_at_north(0.0), t0));
        // t=10s: moved 10m from last forwarded
        assert!(!filter.offer(&fix_at_north(10.0), t0 + Duration::from_secs(10)));
        // t=30s: moved 60m from last forwarded
        assert!(filter.offer(&fix_at_north(60.0), t0 + Duration::from_secs(30)));
        // t=95s: moved 5m, but 65s since last forward
        assert!(filter.offer(&fix_at_north(65.0), t0 + Duration::from_secs(95)));
    }

    #[test]
    fn test_no_displacement_filter_only_forced_refresh() {
        let mut filter = RecurringFilter::new(None, Duration::from_secs(60));
        let t0 = Instant::now();

        assert!(filter.offer(&fix_at_north(0.0), t0));
        assert!(!filter.offer(&fix_at_north(5000.0), t0 + Duration::from_secs(59)));
        assert!(filter.offer(&fix_at_north(5000.0), t0 + Duration::from_secs(60)));
    }

    #[test]
    fn test_displacement_is_measured_from_last_forwarded() {
        let mut filter = RecurringFilter::new(Some(50.0), Duration::from_secs(600));
        let t0 = Instant::now();

        assert!(filter.offer(&fix_at_north(0.0), t0));
        // Creep in 30m steps: each step is under threshold, the sum is not.
        assert!(!filter.offer(&fix_at_north(30.0), t0 + Duration::from_secs(1)));
        assert!(filter.offer(&fix_at_north(60.0), t0 + Duration::from_secs(2)));

        let last = filter.last_forwarded().unwrap();
        assert!((last.latitude - fix_at_north(60.0).latitude).abs() < 1e-12);
    }

    #[test]
    fn test_stationary_fix_is_dropped() {
        let mut filter = RecurringFilter::new(Some(50.0), Duration::from_secs(600));
        let t0 = Instant::now();
        let origin = fix_at_north(0.0);
        assert!(filter.offer(&origin, t0));

        let mut same = origin.clone();
        same.accuracy_m = 1.0;
        assert!(!filter.offer(&same, t0 + Duration::from_secs(1)));
    }
}
