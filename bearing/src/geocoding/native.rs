//! Native (on-host) geocoding and the remote fallback decision.

use super::address::Address;
use super::error::GeocodeError;

/// A platform geocoder.
///
/// Calls are blocking; the task runs them on the blocking pool. Some hosts
/// report a geocoder as present but fail every call, which is why failures
/// are classified rather than propagated.
pub trait NativeGeocoder: Send + Sync {
    /// Whether the host claims native geocoding support.
    fn is_present(&self) -> bool;

    /// Forward geocode a free-text query.
    fn from_location_name(
        &self,
        query: &str,
        max_results: usize,
        locale: &str,
    ) -> Result<Vec<Address>, GeocodeError>;

    /// Reverse geocode a coordinate pair.
    fn from_location(
        &self,
        latitude: f64,
        longitude: f64,
        max_results: usize,
        locale: &str,
    ) -> Result<Vec<Address>, GeocodeError>;
}

/// Outcome of the native attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// At least one address.
    Found(Vec<Address>),
    /// The resolver ran and found nothing.
    Empty,
    /// No resolver, or it failed.
    Unavailable,
}

impl Resolution {
    /// Classify a native result.
    pub fn classify(result: Result<Vec<Address>, GeocodeError>) -> Self {
        match result {
            Ok(addresses) if addresses.is_empty() => Resolution::Empty,
            Ok(addresses) => Resolution::Found(addresses),
            Err(_) => Resolution::Unavailable,
        }
    }
}

/// What an empty native result means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyResultPolicy {
    /// Treat it like a failure and try the remote resolver.
    #[default]
    FallBack,
    /// Trust it and return no addresses.
    Accept,
}

impl std::str::FromStr for EmptyResultPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fallback" | "true" | "yes" => Ok(EmptyResultPolicy::FallBack),
            "accept" | "false" | "no" => Ok(EmptyResultPolicy::Accept),
            other => Err(format!("unknown empty-result policy '{}'", other)),
        }
    }
}

/// Whether the remote resolver should be consulted.
pub fn needs_remote(resolution: &Resolution, policy: EmptyResultPolicy) -> bool {
    match resolution {
        Resolution::Found(_) => false,
        Resolution::Empty => policy == EmptyResultPolicy::FallBack,
        Resolution::Unavailable => true,
    }
}
