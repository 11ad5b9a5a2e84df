//! Korean listing price normalization
//!
//! Listing prices come as strings like `"5억 2,000"`: a quantity of major
//! units (억, 100,000,000 won) followed by an optional remainder in minor
//! units (만, 10,000 won). [`normalize`] turns them into a decimal amount of
//! major units with two-decimal precision.
//!
//! ```
//! use naver_land_ingest::price::{normalize, NormalizedPrice};
//!
//! assert_eq!(normalize("5억 2,000"), NormalizedPrice::Parsed(5.2));
//! assert_eq!(normalize(""), NormalizedPrice::Absent);
//! assert_eq!(normalize("협의"), NormalizedPrice::Unparsed("협의".to_string()));
//! ```

use crate::constants::{MAJOR_UNIT_MARKER, MINOR_PER_MAJOR};
use serde::Serialize;
use std::fmt;

/// Outcome of normalizing a price string
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NormalizedPrice {
    /// The input was empty
    Absent,
    /// Amount in major units, rounded to two decimals
    Parsed(f64),
    /// The input could not be parsed and is returned unchanged
    Unparsed(String),
}

impl NormalizedPrice {
    /// Numeric value for aggregation; unparsed text counts as absent
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            NormalizedPrice::Parsed(value) => Some(*value),
            NormalizedPrice::Absent | NormalizedPrice::Unparsed(_) => None,
        }
    }

    pub fn is_unparsed(&self) -> bool {
        matches!(self, NormalizedPrice::Unparsed(_))
    }
}

impl fmt::Display for NormalizedPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizedPrice::Absent => Ok(()),
            NormalizedPrice::Parsed(value) => write!(f, "{:.2}", value),
            NormalizedPrice::Unparsed(text) => f.write_str(text),
        }
    }
}

/// Normalizes a listing price string into major units.
///
/// The major-unit marker is always replaced by a single space, so
/// `"5억2,000"` and `"5억 2,000"` parse the same. Never fails: anything that
/// does not fit the two-token or one-token shapes comes back as
/// [`NormalizedPrice::Unparsed`] with the original text.
pub fn normalize(text: &str) -> NormalizedPrice {
    if text.is_empty() {
        return NormalizedPrice::Absent;
    }

    let replaced = text.replace(MAJOR_UNIT_MARKER, " ");
    let tokens: Vec<&str> = replaced.split_whitespace().collect();

    let parsed = match tokens.as_slice() {
        [major, minor] => parse_quantity(major).and_then(|major| {
            parse_quantity(&minor.replace(',', "")).map(|minor| major + minor / MINOR_PER_MAJOR)
        }),
        [major] => parse_quantity(major),
        _ => None,
    };

    match parsed {
        Some(value) => NormalizedPrice::Parsed(round_cents(value)),
        None => NormalizedPrice::Unparsed(text.to_string()),
    }
}

fn parse_quantity(token: &str) -> Option<f64> {
    token.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_major_and_minor() {
        assert_eq!(normalize("5 2,000"), NormalizedPrice::Parsed(5.2));
        assert_eq!(normalize("5억 2,000"), NormalizedPrice::Parsed(5.2));
        assert_eq!(normalize("12억 5,500"), NormalizedPrice::Parsed(12.55));
        assert_eq!(normalize("1억 500"), NormalizedPrice::Parsed(1.05));
    }

    #[test]
    fn test_unspaced_marker_matches_spaced() {
        assert_eq!(normalize("5억2,000"), normalize("5억 2,000"));
    }

    #[test]
    fn test_major_only() {
        assert_eq!(normalize("5억"), NormalizedPrice::Parsed(5.0));
        assert_eq!(normalize("7"), NormalizedPrice::Parsed(7.0));
        assert_eq!(normalize("3.456"), NormalizedPrice::Parsed(3.46));
    }

    #[test]
    fn test_empty_is_absent() {
        assert_eq!(normalize(""), NormalizedPrice::Absent);
        assert_eq!(normalize("").as_f64(), None);
    }

    #[test]
    fn test_passthrough() {
        assert_eq!(normalize("abc"), NormalizedPrice::Unparsed("abc".to_string()));
        // minor-only amounts carry thousands separators the single-token path does not strip
        assert_eq!(normalize("9,000"), NormalizedPrice::Unparsed("9,000".to_string()));
        assert_eq!(normalize("5억 abc"), NormalizedPrice::Unparsed("5억 abc".to_string()));
        assert_eq!(normalize("1 2 3"), NormalizedPrice::Unparsed("1 2 3".to_string()));
        assert_eq!(normalize("   "), NormalizedPrice::Unparsed("   ".to_string()));
        assert_eq!(normalize("inf"), NormalizedPrice::Unparsed("inf".to_string()));
        assert!(normalize("abc").is_unparsed());
        assert_eq!(normalize("abc").as_f64(), None);
    }

    #[test]
    fn test_idempotent_on_normalized_output() {
        let first = normalize("5억 2,000");
        assert_eq!(normalize(&first.to_string()), first);
    }

    #[test]
    fn test_display() {
        assert_eq!(normalize("5억").to_string(), "5.00");
        assert_eq!(normalize("").to_string(), "");
        assert_eq!(normalize("문의").to_string(), "문의");
    }
}
