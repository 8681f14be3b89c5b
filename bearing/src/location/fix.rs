//! Position fix type.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::accuracy::SourceKind;
use super::request::LocationRequest;

/// Mean Earth radius in metres.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Where a fix came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixSource {
    /// The managed location service's fused provider.
    Fused,
    /// Satellite positioning.
    Gps,
    /// Cell tower and Wi-Fi positioning.
    Network,
    /// A fix requested by another consumer.
    Passive,
}

impl From<SourceKind> for FixSource {
    fn from(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Gps => FixSource::Gps,
            SourceKind::Network => FixSource::Network,
            SourceKind::Passive => FixSource::Passive,
        }
    }
}

impl fmt::Display for FixSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixSource::Fused => write!(f, "fused"),
            FixSource::Gps => write!(f, "gps"),
            FixSource::Network => write!(f, "network"),
            FixSource::Passive => write!(f, "passive"),
        }
    }
}

/// A single timestamped position reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    /// When the reading was taken.
    pub timestamp: DateTime<Utc>,
    /// Latitude in degrees (-90 to 90).
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180).
    pub longitude: f64,
    /// Reported error radius in metres.
    #[serde(rename = "accuracy")]
    pub accuracy_m: f32,
    /// Which source produced the reading.
    pub source: FixSource,
}

impl Fix {
    /// Create a fix stamped with the current time.
    pub fn new(latitude: f64, longitude: f64, accuracy_m: f32, source: FixSource) -> Self {
        Self::at(Utc::now(), latitude, longitude, accuracy_m, source)
    }

    /// Create a fix with an explicit timestamp.
    pub fn at(
        timestamp: DateTime<Utc>,
        latitude: f64,
        longitude: f64,
        accuracy_m: f32,
        source: FixSource,
    ) -> Self {
        Self {
            timestamp,
            latitude,
            longitude,
            accuracy_m,
            source,
        }
    }

    /// Age of the fix relative to `now`. Fixes from the future are age zero.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.timestamp).to_std().unwrap_or(Duration::ZERO)
    }

    /// Great-circle distance to another fix in metres (haversine).
    pub fn distance_to(&self, other: &Fix) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let delta_lat = (other.latitude - self.latitude).to_radians();
        let delta_lon = (other.longitude - self.longitude).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_M * c
    }

    /// Whether this fix is accurate and fresh enough to answer `request`
    /// from cache.
    pub fn satisfies(&self, request: &LocationRequest, now: DateTime<Utc>) -> bool {
        self.accuracy_m <= request.accuracy.radius_m() && self.age(now) < request.cache_expiry
    }
}

impl fmt::Display for Fix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.6},{:.6} ±{:.0}m ({}, {})",
            self.latitude,
            self.longitude,
            self.accuracy_m,
            self.source,
            self.timestamp.to_rfc3339()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Accuracy;

    #[test]
    fn test_distance_one_degree_latitude() {
        let a = Fix::new(0.0, 0.0, 10.0, FixSource::Gps);
        let b = Fix::new(1.0, 0.0, 10.0, FixSource::Gps);
        let d = a.distance_to(&b);
        assert!((d - 111_195.0).abs() < 10.0, "got {}", d);
    }

    #[test]
    fn test_distance_is_symmetric_and_zero_for_same_point() {
        let a = Fix::new(53.55, 9.99, 10.0, FixSource::Gps);
        let b = Fix::new(53.56, 10.01, 10.0, FixSource::Gps);
        assert!((a.distance_to(&b) - b.distance_to(&a)).abs() < 1e-6);
        assert_eq!(a.distance_to(&a), 0.0);
    }

    #[test]
    fn test_age_of_future_fix_is_zero() {
        let now = Utc::now();
        let fix = Fix::at(
            now + chrono::Duration::seconds(5),
            0.0,
            0.0,
            1.0,
            FixSource::Gps,
        );
        assert_eq!(fix.age(now), Duration::ZERO);
    }

    #[test]
    fn test_satisfies_accuracy_boundary() {
        let now = Utc::now();
        let request = LocationRequest::new().with_accuracy(Accuracy::Medium);

        let exact = Fix::at(now, 0.0, 0.0, 200.0, FixSource::Network);
        assert!(exact.satisfies(&request, now));

        let coarse = Fix::at(now, 0.0, 0.0, 200.5, FixSource::Network);
        assert!(!coarse.satisfies(&request, now));
    }

    #[test]
    fn test_satisfies_expiry() {
        let now = Utc::now();
        let request = LocationRequest::new().with_cache(true, Duration::from_secs(60));

        let fresh = Fix::at(now - chrono::Duration::seconds(30), 0.0, 0.0, 5.0, FixSource::Gps);
        assert!(fresh.satisfies(&request, now));

        let stale = Fix::at(now - chrono::Duration::seconds(61), 0.0, 0.0, 5.0, FixSource::Gps);
        assert!(!stale.satisfies(&request, now));
    }

    #[test]
    fn test_fix_json_shape() {
        let json = r#"{
            "timestamp": "2024-05-01T12:00:00Z",
            "latitude": 51.5,
            "longitude": -0.12,
            "accuracy": 15.0,
            "source": "gps"
        }"#;
        let fix: Fix = serde_json::from_str(json).unwrap();
        assert_eq!(fix.source, FixSource::Gps);
        assert_eq!(fix.accuracy_m, 15.0);
    }
}
