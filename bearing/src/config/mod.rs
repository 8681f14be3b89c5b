//! User configuration.
//!
//! Settings are read from `~/.bearing/config.ini`:
//!
//! ```ini
//! [location]
//! accuracy = medium          ; low | medium | high
//! use_cache = true
//! cache_expiry = 1h
//! fallback = none            ; none | cache
//! fallback_timeout = 10s     ; 0 disables the timer
//! tracking_displacement = -1 ; metres, -1 = off
//! tracking_rate = 20m
//! tracking_fallback = 30m
//!
//! [backend]
//! connect_timeout = 30s
//!
//! [geocoding]
//! api_key =
//! language = en
//! max_results = 10
//! fallback_on_empty = true
//! ```

mod duration;
mod file;
mod parser;
mod settings;

pub use duration::{format_duration, parse_duration, DurationParseError};
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{BackendSettings, ConfigFile, GeocodingSettings, LocationSettings};
