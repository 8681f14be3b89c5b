//! Human-readable duration parsing (e.g., "10s", "5m", "500ms").

use std::time::Duration;
use thiserror::Error;

/// Error parsing a duration string.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid duration '{input}' - expected format like '500ms', '10s', '5m' or '1h'")]
pub struct DurationParseError {
    input: String,
}

impl DurationParseError {
    fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// Parse a human-readable duration.
///
/// Supports:
/// - Bare numbers (treated as seconds)
/// - `ms`, `s`, `m` and `h` suffixes
/// - Case-insensitive
/// - Whitespace tolerant
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use bearing::config::parse_duration;
///
/// assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// assert_eq!(parse_duration("5 m").unwrap(), Duration::from_secs(300));
/// assert_eq!(parse_duration("1H").unwrap(), Duration::from_secs(3600));
/// ```
pub fn parse_duration(s: &str) -> Result<Duration, DurationParseError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(DurationParseError::new(s));
    }

    let lower = trimmed.to_lowercase();

    // "ms" must be checked before "m" and "s".
    let (num_str, millis_per_unit) = if let Some(n) = lower.strip_suffix("ms") {
        (n, 1_u64)
    } else if let Some(n) = lower.strip_suffix('s') {
        (n, 1_000)
    } else if let Some(n) = lower.strip_suffix('m') {
        (n, 60_000)
    } else if let Some(n) = lower.strip_suffix('h') {
        (n, 3_600_000)
    } else {
        (lower.as_str(), 1_000)
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .map_err(|_| DurationParseError::new(s))?;

    num.checked_mul(millis_per_unit)
        .map(Duration::from_millis)
        .ok_or_else(|| DurationParseError::new(s))
}

/// Format a duration the way [`parse_duration`] reads it back.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1_000 != 0 {
        format!("{}ms", millis)
    } else if millis % 3_600_000 == 0 && millis > 0 {
        format!("{}h", millis / 3_600_000)
    } else if millis % 60_000 == 0 && millis > 0 {
        format!("{}m", millis / 60_000)
    } else {
        format!("{}s", millis / 1_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffixes() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("20m").unwrap(), Duration::from_secs(1200));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_whitespace_and_case() {
        assert_eq!(parse_duration("  15 S ").unwrap(), Duration::from_secs(15));
        assert_eq!(parse_duration("100 MS").unwrap(), Duration::from_millis(100));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("ms").is_err());
        assert!(parse_duration("-5s").is_err());
        assert!(parse_duration("1.5s").is_err());
        assert!(parse_duration("ten").is_err());
        assert!(parse_duration("5d").is_err());
    }

    #[test]
    fn test_overflow_is_error() {
        let huge = format!("{}h", u64::MAX);
        assert!(parse_duration(&huge).is_err());
    }

    #[test]
    fn test_format_reads_back() {
        for d in [
            Duration::from_millis(500),
            Duration::from_secs(10),
            Duration::from_secs(300),
            Duration::from_secs(7200),
            Duration::ZERO,
        ] {
            assert_eq!(parse_duration(&format_duration(d)).unwrap(), d);
        }
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
    }
}
