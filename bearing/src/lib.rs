//! Bearing - position acquisition and address resolution
//!
//! This library coordinates one-shot and recurring position requests across
//! interchangeable position backends, and resolves addresses through a
//! native geocoder with a remote HTTP fallback.
//!
//! - [`location`]: request policy, backends, acquisition tasks
//! - [`geocoding`]: forward and reverse address resolution
//! - [`config`]: `~/.bearing/config.ini` loading
//! - [`logging`]: tracing subscriber setup

pub mod config;
pub mod geocoding;
pub mod location;
pub mod logging;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
