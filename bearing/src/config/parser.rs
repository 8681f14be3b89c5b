//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};

use super::duration::parse_duration;
use super::file::ConfigFileError;
use super::settings::ConfigFile;
use crate::location::FallbackMode;

const DURATION_HINT: &str = "expected format like '500ms', '10s', '5m' or '1h'";

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [location] section
    if let Some(section) = ini.section(Some("location")) {
        let loc = &mut config.location;
        if let Some(v) = section.get("accuracy") {
            loc.accuracy = parse_enum(
                "location",
                "accuracy",
                v,
                "must be one of: low, medium, high",
            )?;
        }
        if let Some(v) = section.get("use_cache") {
            loc.use_cache = parse_bool("location", "use_cache", v)?;
        }
        if let Some(d) = get_duration(section, "location", "cache_expiry")? {
            loc.cache_expiry = d;
        }
        if let Some(v) = section.get("fallback") {
            loc.fallback = match v.trim().to_lowercase().as_str() {
                "none" => FallbackMode::None,
                "cache" | "use_cache" => FallbackMode::UseCache,
                _ => return Err(invalid("location", "fallback", v, "must be one of: none, cache")),
            };
        }
        if let Some(d) = get_duration(section, "location", "fallback_timeout")? {
            loc.fallback_timeout = d;
        }
        if let Some(v) = section.get("tracking_displacement") {
            let metres: f64 = v.trim().parse().map_err(|_| {
                invalid(
                    "location",
                    "tracking_displacement",
                    v,
                    "must be a number of metres, or -1 to disable",
                )
            })?;
            if !metres.is_finite() {
                return Err(invalid(
                    "location",
                    "tracking_displacement",
                    v,
                    "must be a finite number",
                ));
            }
            loc.tracking_displacement = (metres >= 0.0).then_some(metres);
        }
        if let Some(d) = get_duration(section, "location", "tracking_rate")? {
            if d.is_zero() {
                return Err(invalid(
                    "location",
                    "tracking_rate",
                    section.get("tracking_rate").unwrap_or_default(),
                    "must be positive",
                ));
            }
            loc.tracking_rate = d;
        }
        if let Some(d) = get_duration(section, "location", "tracking_fallback")? {
            if d.is_zero() {
                return Err(invalid(
                    "location",
                    "tracking_fallback",
                    section.get("tracking_fallback").unwrap_or_default(),
                    "must be positive",
                ));
            }
            loc.tracking_fallback = d;
        }
    }

    if config.location.use_cache && config.location.cache_expiry.is_zero() {
        return Err(ConfigFileError::InvalidValue {
            section: "location".to_string(),
            key: "cache_expiry".to_string(),
            value: "0".to_string(),
            reason: "must be positive when use_cache is enabled".to_string(),
        });
    }

    // [backend] section
    if let Some(section) = ini.section(Some("backend")) {
        if let Some(d) = get_duration(section, "backend", "connect_timeout")? {
            if d.is_zero() {
                return Err(invalid(
                    "backend",
                    "connect_timeout",
                    section.get("connect_timeout").unwrap_or_default(),
                    "must be positive",
                ));
            }
            config.backend.connect_timeout = d;
        }
    }

    // [geocoding] section
    if let Some(section) = ini.section(Some("geocoding")) {
        let geo = &mut config.geocoding;
        if let Some(v) = section.get("api_key") {
            let v = v.trim();
            if !v.is_empty() {
                geo.api_key = Some(v.to_string());
            }
        }
        if let Some(v) = section.get("language") {
            let v = v.trim();
            if v.is_empty() {
                return Err(invalid("geocoding", "language", v, "must not be empty"));
            }
            geo.language = v.to_string();
        }
        if let Some(v) = section.get("max_results") {
            geo.max_results = match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(invalid(
                        "geocoding",
                        "max_results",
                        v,
                        "must be a positive integer",
                    ))
                }
            };
        }
        if let Some(v) = section.get("fallback_on_empty") {
            geo.fallback_on_empty = parse_enum(
                "geocoding",
                "fallback_on_empty",
                v,
                "must be one of: true, false, fallback, accept",
            )?;
        }
    }

    Ok(config)
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn get_duration(
    section: &Properties,
    section_name: &str,
    key: &str,
) -> Result<Option<Duration>, ConfigFileError> {
    section
        .get(key)
        .map(|v| parse_duration(v).map_err(|_| invalid(section_name, key, v, DURATION_HINT)))
        .transpose()
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigFileError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(section, key, value, "must be true or false")),
    }
}

fn parse_enum<T: FromStr>(
    section: &str,
    key: &str,
    value: &str,
    reason: &str,
) -> Result<T, ConfigFileError> {
    value
        .parse()
        .map_err(|_| invalid(section, key, value, reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocoding::EmptyResultPolicy;
    use crate::location::Accuracy;

    fn parse(content: &str) -> Result<ConfigFile, ConfigFileError> {
        let ini = Ini::load_from_str(content).unwrap();
        parse_ini(&ini)
    }

    #[test]
    fn test_empty_ini_is_default() {
        assert_eq!(parse("").unwrap(), ConfigFile::default());
    }

    #[test]
    fn test_location_section() {
        let config = parse(
            "[location]\n\
             accuracy = high\n\
             use_cache = no\n\
             cache_expiry = 5m\n\
             fallback = cache\n\
             fallback_timeout = 2500ms\n\
             tracking_displacement = 50\n\
             tracking_rate = 30s\n\
             tracking_fallback = 2m\n",
        )
        .unwrap();

        let loc = &config.location;
        assert_eq!(loc.accuracy, Accuracy::High);
        assert!(!loc.use_cache);
        assert_eq!(loc.cache_expiry, Duration::from_secs(300));
        assert_eq!(loc.fallback, FallbackMode::UseCache);
        assert_eq!(loc.fallback_timeout, Duration::from_millis(2500));
        assert_eq!(loc.tracking_displacement, Some(50.0));
        assert_eq!(loc.tracking_rate, Duration::from_secs(30));
        assert_eq!(loc.tracking_fallback, Duration::from_secs(120));
    }

    #[test]
    fn test_negative_displacement_disables_filter() {
        let config = parse("[location]\ntracking_displacement = -1\n").unwrap();
        assert_eq!(config.location.tracking_displacement, None);
    }

    #[test]
    fn test_zero_fallback_timeout_is_allowed() {
        let config = parse("[location]\nfallback_timeout = 0\n").unwrap();
        assert!(config.location.fallback_timeout.is_zero());
        assert!(!config.location_request().has_timeout());
    }

    #[test]
    fn test_invalid_values_name_the_key() {
        let cases = [
            ("[location]\naccuracy = extreme\n", "accuracy"),
            ("[location]\nuse_cache = maybe\n", "use_cache"),
            ("[location]\ncache_expiry = soon\n", "cache_expiry"),
            ("[location]\nfallback = retry\n", "fallback"),
            ("[location]\ntracking_displacement = far\n", "tracking_displacement"),
            ("[location]\ntracking_rate = 0\n", "tracking_rate"),
            ("[backend]\nconnect_timeout = 0s\n", "connect_timeout"),
            ("[geocoding]\nmax_results = 0\n", "max_results"),
            ("[geocoding]\nfallback_on_empty = sometimes\n", "fallback_on_empty"),
        ];

        for (content, expected_key) in cases {
            match parse(content) {
                Err(ConfigFileError::InvalidValue { key, .. }) => assert_eq!(key, expected_key),
                other => panic!("{}: expected InvalidValue, got {:?}", expected_key, other),
            }
        }
    }

    #[test]
    fn test_cache_enabled_with_zero_expiry_rejected() {
        assert!(parse("[location]\ncache_expiry = 0\n").is_err());
        assert!(parse("[location]\nuse_cache = false\ncache_expiry = 0\n").is_ok());
    }

    #[test]
    fn test_geocoding_section() {
        let config = parse(
            "[geocoding]\n\
             api_key = abc123\n\
             language = de\n\
             max_results = 3\n\
             fallback_on_empty = false\n",
        )
        .unwrap();

        assert_eq!(config.geocoding.api_key.as_deref(), Some("abc123"));
        assert_eq!(config.geocoding.language, "de");
        assert_eq!(config.geocoding.max_results, 3);
        assert_eq!(config.geocoding.fallback_on_empty, EmptyResultPolicy::Accept);
    }

    #[test]
    fn test_blank_api_key_stays_unset() {
        let config = parse("[geocoding]\napi_key =\n").unwrap();
        assert!(config.geocoding.api_key.is_none());
    }

    #[test]
    fn test_location_request_carries_settings() {
        let config = parse(
            "[location]\naccuracy = low\nfallback = cache\nfallback_timeout = 4s\n\
             tracking_displacement = 25\n",
        )
        .unwrap();
        let request = config.location_request();

        assert_eq!(request.accuracy, Accuracy::Low);
        assert_eq!(request.fallback_mode, FallbackMode::UseCache);
        assert_eq!(request.fallback_timeout, Duration::from_secs(4));
        assert_eq!(request.tracking_displacement, Some(25.0));
        assert!(request.validate_tracking().is_ok());
    }
}
