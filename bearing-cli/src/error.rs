//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;

use bearing::config::ConfigFileError;
use bearing::geocoding::{GeocodeError, HttpError};
use bearing::location::LocationError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Invalid or unreadable config file
    ConfigFile(ConfigFileError),
    /// Failed to start the async runtime
    Runtime(std::io::Error),
    /// Fix replay file could not be loaded
    Replay { path: String, reason: String },
    /// Location request could not be started
    Location(LocationError),
    /// No fix was produced
    NoFix(String),
    /// Address resolution failed
    Geocode(GeocodeError),
}

impl CliError {
    /// Exit code for this error.
    pub fn code(&self) -> i32 {
        match self {
            CliError::NoFix(_) => 2,
            _ => 1,
        }
    }

    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Geocode(GeocodeError::Service { status, .. })
                if status == "REQUEST_DENIED" =>
            {
                eprintln!();
                eprintln!("The geocoding service refused the request. Make sure:");
                eprintln!("  1. api_key is set in the [geocoding] section of config.ini");
                eprintln!("  2. The Geocoding API is enabled for that key");
            }
            CliError::Geocode(GeocodeError::Http(HttpError::Request(_))) => {
                eprintln!();
                eprintln!("Check your network connection and try again.");
            }
            CliError::Replay { .. } => {
                eprintln!();
                eprintln!("The replay file must be a JSON array of fixes, for example:");
                eprintln!(
                    r#"  [{{"timestamp": "2025-01-01T12:00:00Z", "latitude": 52.52, "longitude": 13.405, "accuracy": 12.0, "source": "gps"}}]"#
                );
            }
            _ => {}
        }

        process::exit(self.code())
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ConfigFile(e) => write!(f, "{}", e),
            CliError::Runtime(e) => write!(f, "Failed to start runtime: {}", e),
            CliError::Replay { path, reason } => {
                write!(f, "Failed to load fixes from '{}': {}", path, reason)
            }
            CliError::Location(e) => write!(f, "Location request failed: {}", e),
            CliError::NoFix(msg) => write!(f, "No position fix: {}", msg),
            CliError::Geocode(e) => write!(f, "Geocoding failed: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ConfigFile(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            CliError::Location(e) => Some(e),
            CliError::Geocode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<LocationError> for CliError {
    fn from(e: LocationError) -> Self {
        CliError::Location(e)
    }
}

impl From<GeocodeError> for CliError {
    fn from(e: GeocodeError) -> Self {
        CliError::Geocode(e)
    }
}
