//! Normalized postal address.
//!
//! Remote results carry typed "address components". Each type tag maps to
//! one [`Address`] field:
//!
//! | Tag                                  | Field            |
//! |--------------------------------------|------------------|
//! | `country`                            | `country_name`, `country_code` |
//! | `route`                              | `thoroughfare`   |
//! | `administrative_area_level_1`        | `admin_area`     |
//! | `administrative_area_level_2`        | `sub_admin_area` |
//! | `locality`, `ward`                   | `locality`       |
//! | `sublocality`                        | `sub_locality`   |
//! | `neighborhood`                       | `sub_locality` if unset |
//! | `premise`                            | `premises`       |
//! | `street_number`                      | `premises` if unset |
//! | `postal_code`                        | `postal_code`    |
//! | `natural_feature`, `airport`, `park`, `point_of_interest`, `intersection` | `feature_name` |
//!
//! Other tags are ignored.

use std::fmt;

use serde::Serialize;

/// A resolved address.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Address {
    /// Language tag the address was resolved in.
    pub locale: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Display lines, most specific first.
    pub lines: Vec<String>,
    pub feature_name: Option<String>,
    pub premises: Option<String>,
    pub thoroughfare: Option<String>,
    pub sub_locality: Option<String>,
    pub locality: Option<String>,
    pub sub_admin_area: Option<String>,
    pub admin_area: Option<String>,
    pub postal_code: Option<String>,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
}

impl Address {
    /// Create an empty address in the given locale.
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            ..Default::default()
        }
    }

    /// Set the coordinates.
    pub fn with_position(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    /// Display line at `index`.
    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    /// Apply one typed component. Each tag in `types` is applied in order.
    pub fn apply_component<S: AsRef<str>>(&mut self, long_name: &str, short_name: &str, types: &[S]) {
        for tag in types {
            match tag.as_ref() {
                "country" => {
                    self.country_name = Some(long_name.to_string());
                    self.country_code = Some(short_name.to_string());
                }
                "route" => self.thoroughfare = Some(long_name.to_string()),
                "administrative_area_level_1" => self.admin_area = Some(long_name.to_string()),
                "administrative_area_level_2" => self.sub_admin_area = Some(long_name.to_string()),
                "locality" | "ward" => self.locality = Some(long_name.to_string()),
                "sublocality" => self.sub_locality = Some(long_name.to_string()),
                "neighborhood" => {
                    self.sub_locality.get_or_insert_with(|| long_name.to_string());
                }
                "premise" => self.premises = Some(long_name.to_string()),
                "street_number" => {
                    self.premises.get_or_insert_with(|| long_name.to_string());
                }
                "postal_code" => self.postal_code = Some(long_name.to_string()),
                "natural_feature" | "airport" | "park" | "point_of_interest" | "intersection" => {
                    self.feature_name = Some(long_name.to_string())
                }
                _ => {}
            }
        }
    }

    /// Replace the display lines with those derived from a formatted
    /// single-line address.
    pub fn set_formatted(&mut self, formatted: &str) {
        self.lines = split_address_lines(formatted);
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.lines.join(", "))?;
        if let (Some(lat), Some(lng)) = (self.latitude, self.longitude) {
            write!(f, " ({:.6},{:.6})", lat, lng)?;
        }
        Ok(())
    }
}

fn is_bare_number(part: &str) -> bool {
    !part.is_empty() && part.chars().all(|c| c.is_ascii_digit())
}

/// Split a formatted address on `", "` into display lines.
///
/// A part that is only digits is merged into the following part (a house
/// number joins its street). Consecutive identical lines collapse into one,
/// and blank parts are skipped.
///
/// ```
/// use bearing::geocoding::split_address_lines;
///
/// let lines = split_address_lines("221, Baker Street, London, London, NW1 6XE, UK");
/// assert_eq!(lines, vec!["221, Baker Street", "London", "NW1 6XE", "UK"]);
/// ```
pub fn split_address_lines(formatted: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut carried: Option<String> = None;
    let mut parts = formatted.split(", ").map(str::trim).peekable();

    while let Some(part) = parts.next() {
        let part = match carried.take() {
            Some(number) => format!("{}, {}", number, part),
            None => part.to_string(),
        };

        if is_bare_number(&part) && parts.peek().is_some() {
            carried = Some(part);
            continue;
        }

        if part.is_empty() {
            continue;
        }

        if lines.last() != Some(&part) {
            lines.push(part);
        }
    }

    lines
}
