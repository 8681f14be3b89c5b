//! Common types and utilities shared across CLI commands.

use std::path::PathBuf;
use std::time::Duration;

use bearing::config::{parse_duration, ConfigFile};
use bearing::location::{Accuracy, LocationRequest};
use bearing::logging::{default_log_dir, default_log_file, init_logging, LoggingGuard};
use clap::ValueEnum;
use tracing::debug;

use crate::error::CliError;

/// Accuracy tier selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum AccuracyArg {
    /// Within 2 km (network positioning is enough)
    Low,
    /// Within 200 m
    Medium,
    /// Within 20 m (satellite positioning)
    High,
}

impl From<AccuracyArg> for Accuracy {
    fn from(arg: AccuracyArg) -> Self {
        match arg {
            AccuracyArg::Low => Accuracy::Low,
            AccuracyArg::Medium => Accuracy::Medium,
            AccuracyArg::High => Accuracy::High,
        }
    }
}

/// Output format for results.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Default)]
pub enum OutputFormat {
    /// One human-readable line per result
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// clap value parser for durations such as `10s` or `500ms`.
pub fn duration_arg(s: &str) -> Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}

/// Options shared by every subcommand.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub accuracy: Option<AccuracyArg>,
    pub timeout: Option<Duration>,
    pub verbose: bool,
    pub output: OutputFormat,
}

/// Config and logging for one CLI invocation.
pub struct CliContext {
    #[allow(dead_code)]
    logging_guard: LoggingGuard,
    pub config: ConfigFile,
    pub options: GlobalOptions,
}

impl CliContext {
    /// Load the config file and start logging.
    pub fn new(options: GlobalOptions) -> Result<Self, CliError> {
        let filter = if options.verbose { "debug" } else { "warn" };
        let logging_guard = init_logging(&default_log_dir(), default_log_file(), filter)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        let config = match &options.config {
            Some(path) => {
                if !path.exists() {
                    return Err(CliError::Config(format!(
                        "config file '{}' does not exist",
                        path.display()
                    )));
                }
                ConfigFile::load_from(path)?
            }
            None => ConfigFile::load()?,
        };
        debug!(config = ?config, "Configuration loaded");

        Ok(Self {
            logging_guard,
            config,
            options,
        })
    }

    /// Request policy from config with command-line overrides applied.
    pub fn location_request(&self) -> LocationRequest {
        resolve_request(&self.config, self.options.accuracy, self.options.timeout)
    }
}

/// Resolve request policy: CLI takes precedence, then config.
pub fn resolve_request(
    config: &ConfigFile,
    accuracy: Option<AccuracyArg>,
    timeout: Option<Duration>,
) -> LocationRequest {
    let mut request = config.location_request();
    if let Some(accuracy) = accuracy {
        request.accuracy = accuracy.into();
    }
    if let Some(timeout) = timeout {
        request.fallback_timeout = timeout;
    }
    request
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let config =
            ConfigFile::from_ini_str("[location]\naccuracy = low\nfallback_timeout = 30s\n")
                .unwrap();

        let request = resolve_request(&config, Some(AccuracyArg::High), None);
        assert_eq!(request.accuracy, Accuracy::High);
        assert_eq!(request.fallback_timeout, Duration::from_secs(30));

        let request = resolve_request(&config, None, Some(Duration::from_secs(3)));
        assert_eq!(request.accuracy, Accuracy::Low);
        assert_eq!(request.fallback_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_duration_arg() {
        assert_eq!(duration_arg("250ms").unwrap(), Duration::from_millis(250));
        assert!(duration_arg("soon").is_err());
    }
}
