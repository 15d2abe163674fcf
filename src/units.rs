//! Measurement parsing for unit-ambiguous stat text.
//!
//! The host page renders measurements as free text ("106.76 km",
//! "66.34 mi", "10,138 ft") whose unit depends on the viewer's locale
//! settings. This module normalizes them to canonical units: kilometers
//! for distances, meters for elevations.

use once_cell::sync::Lazy;
use regex::Regex;

/// Fixed conversion factor from statute miles to kilometers.
pub const MILES_TO_KM: f64 = 1.60934;

/// Fixed conversion factor from feet to meters.
pub const FEET_TO_METERS: f64 = 0.3048;

/// A decimal number with comma grouping, optionally followed by a unit token.
static MEASUREMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)([\d.,]+)\s*(km|mi|m|ft)?").expect("measurement pattern"));

/// Parsing options for [`parse_measurement`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeasureOptions {
    /// Convert a trailing "ft" token to meters. Distances never carry feet,
    /// so this is only requested for elevation values.
    pub convert_feet: bool,
}

impl MeasureOptions {
    /// Distance semantics: "mi" converts to km, everything else passes through.
    pub fn distance() -> Self {
        Self {
            convert_feet: false,
        }
    }

    /// Elevation semantics: "ft" converts to meters.
    pub fn elevation() -> Self {
        Self { convert_feet: true }
    }
}

/// Parse a free-text measurement into its canonical unit.
///
/// Accepts a comma-grouped decimal number optionally followed by a unit in
/// {km, mi, m, ft}, case-insensitive. "mi" is always converted to km;
/// "ft" is converted to meters only when [`MeasureOptions::convert_feet`]
/// is set; an absent unit means the value is already in the target unit.
///
/// Returns `None` when no parseable number is present. Malformed input is
/// never an error.
///
/// # Example
/// ```
/// use route_compare::units::{parse_measurement, MeasureOptions};
///
/// let km = parse_measurement("66.34 mi", MeasureOptions::distance()).unwrap();
/// assert!((km - 66.34 * 1.60934).abs() < 1e-9);
///
/// assert_eq!(parse_measurement("--", MeasureOptions::distance()), None);
/// ```
pub fn parse_measurement(text: &str, opts: MeasureOptions) -> Option<f64> {
    let caps = MEASUREMENT.captures(text)?;
    let number = caps.get(1)?.as_str().replace(',', "");
    let value: f64 = number.parse().ok()?;
    if !value.is_finite() {
        return None;
    }

    match caps.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(unit) if unit == "mi" => Some(value * MILES_TO_KM),
        Some(unit) if unit == "ft" && opts.convert_feet => Some(value * FEET_TO_METERS),
        _ => Some(value),
    }
}
