//! Address resolution.
//!
//! Forward (query to addresses) and reverse (coordinates to addresses)
//! geocoding with a native-first, remote-fallback policy.
//!
//! # Example
//!
//! ```ignore
//! use bearing::geocoding::{AsyncReqwestClient, GeocodingTask, RemoteGeocoder};
//!
//! let remote = RemoteGeocoder::new(AsyncReqwestClient::new()?).with_api_key(key);
//! let handle = GeocodingTask::forward("Brandenburger Tor")
//!     .remote(remote)
//!     .results(3)
//!     .start()?;
//!
//! if let Some(Ok(addresses)) = handle.outcome().await {
//!     for address in addresses {
//!         println!("{}", address);
//!     }
//! }
//! ```

mod address;
mod error;
mod http;
mod native;
mod remote;
mod task;

pub use address::{split_address_lines, Address};
pub use error::GeocodeError;
pub use http::{AsyncHttpClient, AsyncReqwestClient, HttpError, DEFAULT_USER_AGENT};
pub use native::{needs_remote, EmptyResultPolicy, NativeGeocoder, Resolution};
pub use remote::{parse_response, RemoteGeocoder, GEOCODE_API_URL};
pub use task::{
    GeocodeQuery, GeocodingHandle, GeocodingTask, DEFAULT_LOCALE, DEFAULT_MAX_RESULTS,
};
