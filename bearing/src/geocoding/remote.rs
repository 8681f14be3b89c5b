//! Remote HTTP+JSON geocoder.
//!
//! # Response Shape
//!
//! ```text
//! {
//!   "status": "OK",
//!   "results": [
//!     {
//!       "formatted_address": "...",
//!       "geometry": { "location": { "lat": 0.0, "lng": 0.0 } },
//!       "address_components": [
//!         { "long_name": "...", "short_name": "...", "types": ["..."] }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! Any transport error, non-2xx status, malformed body or error status fails
//! the whole request; partial results are never returned.

use reqwest::Url;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::address::Address;
use super::error::GeocodeError;
use super::http::AsyncHttpClient;

/// Geocoding endpoint.
pub const GEOCODE_API_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    formatted_address: String,
    geometry: Geometry,
    #[serde(default)]
    address_components: Vec<AddressComponent>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct AddressComponent {
    long_name: String,
    short_name: String,
    #[serde(default)]
    types: Vec<String>,
}

/// Parse a geocoding response into at most `max_results` addresses.
pub fn parse_response(
    body: &[u8],
    max_results: usize,
    locale: &str,
) -> Result<Vec<Address>, GeocodeError> {
    let response: GeocodeResponse = serde_json::from_slice(body)?;

    if let Some(status) = response.status {
        if status != "OK" && status != "ZERO_RESULTS" {
            return Err(GeocodeError::Service {
                status,
                message: response.error_message.unwrap_or_default(),
            });
        }
    }

    let addresses = response
        .results
        .into_iter()
        .take(max_results)
        .map(|result| {
            let mut address = Address::new(locale)
                .with_position(result.geometry.location.lat, result.geometry.location.lng);
            address.set_formatted(&result.formatted_address);
            for component in &result.address_components {
                address.apply_component(
                    &component.long_name,
                    &component.short_name,
                    &component.types,
                );
            }
            address
        })
        .collect();

    Ok(addresses)
}

/// Client for the remote geocoding service.
pub struct RemoteGeocoder<C: AsyncHttpClient> {
    http_client: C,
    endpoint: String,
    api_key: Option<String>,
}

impl<C: AsyncHttpClient> RemoteGeocoder<C> {
    /// Create a geocoder against the default endpoint.
    pub fn new(http_client: C) -> Self {
        Self {
            http_client,
            endpoint: GEOCODE_API_URL.to_string(),
            api_key: None,
        }
    }

    /// Send an API key with every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let key = api_key.into();
        self.api_key = (!key.is_empty()).then_some(key);
        self
    }

    /// Use a different endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn build_url(&self, query: (&str, &str), locale: &str) -> Result<String, GeocodeError> {
        let mut params = vec![query, ("language", locale)];
        if let Some(key) = &self.api_key {
            params.push(("key", key.as_str()));
        }

        Url::parse_with_params(&self.endpoint, &params)
            .map(String::from)
            .map_err(|e| GeocodeError::InvalidQuery(format!("bad endpoint {}: {}", self.endpoint, e)))
    }

    /// URL for a forward query.
    pub fn forward_url(&self, query: &str, locale: &str) -> Result<String, GeocodeError> {
        self.build_url(("address", query), locale)
    }

    /// URL for a reverse query.
    pub fn reverse_url(
        &self,
        latitude: f64,
        longitude: f64,
        locale: &str,
    ) -> Result<String, GeocodeError> {
        let latlng = format!("{},{}", latitude, longitude);
        self.build_url(("latlng", latlng.as_str()), locale)
    }

    /// Resolve a free-text query.
    pub async fn forward(
        &self,
        query: &str,
        max_results: usize,
        locale: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Address>, GeocodeError> {
        let url = self.forward_url(query, locale)?;
        self.fetch(&url, max_results, locale, cancel).await
    }

    /// Resolve a coordinate pair.
    pub async fn reverse(
        &self,
        latitude: f64,
        longitude: f64,
        max_results: usize,
        locale: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Address>, GeocodeError> {
        let url = self.reverse_url(latitude, longitude, locale)?;
        self.fetch(&url, max_results, locale, cancel).await
    }

    async fn fetch(
        &self,
        url: &str,
        max_results: usize,
        locale: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Address>, GeocodeError> {
        let body = self.http_client.get(url, cancel).await.map_err(|e| {
            warn!(error = %e, "Network error contacting geocoding service");
            GeocodeError::from(e)
        })?;

        if cancel.is_cancelled() {
            return Err(GeocodeError::Cancelled);
        }

        let addresses = parse_response(&body, max_results, locale).map_err(|e| {
            warn!(error = %e, "Geocoding response rejected");
            e
        })?;

        debug!(results = addresses.len(), "Remote geocoding finished");
        Ok(addresses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocoding::http::tests::MockHttpClient;
    use crate::geocoding::http::HttpError;

    const RESPONSE: &str = r#"{
        "status": "OK",
        "results": [
            {
                "formatted_address": "1600, Amphitheatre Pkwy, Mountain View, CA 94043, USA",
                "geometry": { "location": { "lat": 37.4224, "lng": -122.0842 } },
                "address_components": [
                    { "long_name": "1600", "short_name": "1600", "types": ["street_number"] },
                    { "long_name": "Amphitheatre Parkway", "short_name": "Amphitheatre Pkwy", "types": ["route"] },
                    { "long_name": "Mountain View", "short_name": "Mountain View", "types": ["locality", "political"] },
                    { "long_name": "Santa Clara County", "short_name": "Santa Clara County", "types": ["administrative_area_level_2", "political"] },
                    { "long_name": "California", "short_name": "CA", "types": ["administrative_area_level_1", "political"] },
                    { "long_name": "United States", "short_name": "US", "types": ["country", "political"] },
                    { "long_name": "94043", "short_name": "94043", "types": ["postal_code"] }
                ]
            },
            {
                "formatted_address": "Mountain View, CA, USA",
                "geometry": { "location": { "lat": 37.3861, "lng": -122.0839 } },
                "address_components": []
            }
        ]
    }"#;

    #[test]
    fn test_parse_maps_components() {
        let addresses = parse_response(RESPONSE.as_bytes(), 10, "en").unwrap();
        assert_eq!(addresses.len(), 2);

        let first = &addresses[0];
        assert_eq!(first.latitude, Some(37.4224));
        assert_eq!(first.line(0), Some("1600, Amphitheatre Pkwy"));
        assert_eq!(first.premises.as_deref(), Some("1600"));
        assert_eq!(first.thoroughfare.as_deref(), Some("Amphitheatre Parkway"));
        assert_eq!(first.locality.as_deref(), Some("Mountain View"));
        assert_eq!(first.admin_area.as_deref(), Some("California"));
        assert_eq!(first.sub_admin_area.as_deref(), Some("Santa Clara County"));
        assert_eq!(first.country_code.as_deref(), Some("US"));
        assert_eq!(first.postal_code.as_deref(), Some("94043"));
    }

    #[test]
    fn test_parse_caps_results() {
        let addresses = parse_response(RESPONSE.as_bytes(), 1, "en").unwrap();
        assert_eq!(addresses.len(), 1);
    }

    #[test]
    fn test_zero_results_is_empty() {
        let body = br#"{"status": "ZERO_RESULTS", "results": []}"#;
        assert!(parse_response(body, 10, "en").unwrap().is_empty());
    }

    #[test]
    fn test_error_status_fails() {
        let body = br#"{"status": "OVER_QUERY_LIMIT", "error_message": "slow down", "results": []}"#;
        assert!(matches!(
            parse_response(body, 10, "en"),
            Err(GeocodeError::Service { ref status, .. }) if status == "OVER_QUERY_LIMIT"
        ));
    }

    #[test]
    fn test_malformed_json_fails() {
        assert!(matches!(
            parse_response(b"<html>", 10, "en"),
            Err(GeocodeError::Json(_))
        ));
        // Missing geometry on one result fails the whole response.
        let body = br#"{"results": [{"formatted_address": "x"}]}"#;
        assert!(matches!(
            parse_response(body, 10, "en"),
            Err(GeocodeError::Json(_))
        ));
    }

    #[test]
    fn test_forward_url_is_encoded() {
        let geocoder = RemoteGeocoder::new(MockHttpClient::json("{}")).with_api_key("k3y");
        let url = geocoder.forward_url("10 Downing St, London & Co", "en-GB").unwrap();

        assert!(url.starts_with(GEOCODE_API_URL));
        assert!(url.contains("address=10+Downing+St%2C+London+%26+Co"));
        assert!(url.contains("language=en-GB"));
        assert!(url.ends_with("key=k3y"));
    }

    #[test]
    fn test_reverse_url_without_key() {
        let geocoder = RemoteGeocoder::new(MockHttpClient::json("{}")).with_api_key("");
        let url = geocoder.reverse_url(48.8584, 2.2945, "fr").unwrap();

        assert!(url.contains("latlng=48.8584%2C2.2945"));
        assert!(!url.contains("key="));
    }

    #[tokio::test]
    async fn test_forward_fetches_and_parses() {
        let geocoder = RemoteGeocoder::new(MockHttpClient::json(RESPONSE));
        let addresses = geocoder
            .forward("googleplex", 5, "en", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(addresses.len(), 2);
        let requested = geocoder.http_client.last_url().unwrap();
        assert!(requested.contains("address=googleplex"));
    }

    #[tokio::test]
    async fn test_http_failure_propagates() {
        let geocoder = RemoteGeocoder::new(MockHttpClient::new(Err(HttpError::Status {
            status: 500,
            url: GEOCODE_API_URL.to_string(),
        })));
        let result = geocoder
            .reverse(1.0, 2.0, 5, "en", &CancellationToken::new())
            .await;

        assert!(matches!(
            result,
            Err(GeocodeError::Http(HttpError::Status { status: 500, .. }))
        ));
    }
}
