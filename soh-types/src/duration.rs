//! Text representation of signed durations.
//!
//! Durations in definitions and result records are written as a number
//! followed by a unit, e.g. `"20s"`, `"1.5ms"`, `"-250us"`. Values may be
//! negative because lag and timeliness can legitimately come out below zero
//! when clocks disagree.

use chrono::Duration;

/// Errors produced when parsing a duration string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationParseError {
    /// The string does not end in a known unit.
    #[error("Unknown duration format: {0}")]
    UnknownFormat(String),

    /// The numeric part is not a finite number or does not fit in 64-bit nanoseconds.
    #[error("Invalid duration value: {0}")]
    InvalidValue(String),
}

/// Suffix to nanoseconds multiplier (order matters: longer suffixes first)
const UNITS: &[(&str, f64)] = &[
    ("ns", 1.0),
    ("µs", 1_000.0),
    ("us", 1_000.0),
    ("ms", 1_000_000.0),
    ("s", 1_000_000_000.0),
    ("m", 60_000_000_000.0),
    ("h", 3_600_000_000_000.0),
];

/// Parse duration strings like `"29.99s"`, `"988.82ms"`, `"16.958µs"`, `"-5s"`, `"1h"`.
pub fn parse_duration(s: &str) -> Result<Duration, DurationParseError> {
    let s = s.trim();

    for (suffix, multiplier) in UNITS {
        if let Some(val_str) = s.strip_suffix(suffix) {
            let val: f64 = val_str
                .trim()
                .parse()
                .map_err(|_| DurationParseError::InvalidValue(s.to_string()))?;
            let nanos = (val * multiplier).round();
            if !nanos.is_finite() || nanos.abs() >= i64::MAX as f64 {
                return Err(DurationParseError::InvalidValue(s.to_string()));
            }
            return Ok(Duration::nanoseconds(nanos as i64));
        }
    }

    Err(DurationParseError::UnknownFormat(s.to_string()))
}

/// Format a duration using the largest unit that represents it exactly.
///
/// The output always parses back to the same value with [`parse_duration`].
pub fn format_duration(d: Duration) -> String {
    match d.num_nanoseconds() {
        Some(0) => "0s".to_string(),
        Some(n) if n % 1_000_000_000 == 0 => format!("{}s", n / 1_000_000_000),
        Some(n) if n % 1_000_000 == 0 => format!("{}ms", n / 1_000_000),
        Some(n) if n % 1_000 == 0 => format!("{}us", n / 1_000),
        Some(n) => format!("{}ns", n),
        // Beyond ~292 years nanoseconds overflow; seconds are plenty there.
        None => format!("{}s", d.num_seconds()),
    }
}

/// Serde adapter for `chrono::Duration` fields using the text format.
#[cfg(feature = "serde")]
pub mod text {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for `Option<chrono::Duration>` fields using the text format.
#[cfg(feature = "serde")]
pub mod option_text {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        d: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => serializer.serialize_some(&super::format_duration(*d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|s| super::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seconds() {
        let d = parse_duration("29.992671083s").unwrap();
        assert_eq!(d.num_nanoseconds(), Some(29_992_671_083));
    }

    #[test]
    fn test_parse_milliseconds() {
        let d = parse_duration("988.5ms").unwrap();
        assert_eq!(d.num_microseconds(), Some(988_500));
    }

    #[test]
    fn test_parse_microseconds_both_spellings() {
        assert_eq!(parse_duration("16.958µs").unwrap().num_nanoseconds(), Some(16_958));
        assert_eq!(parse_duration("16us").unwrap().num_nanoseconds(), Some(16_000));
    }

    #[test]
    fn test_parse_minutes_and_hours() {
        assert_eq!(parse_duration("2m").unwrap(), Duration::seconds(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::seconds(3600));
    }

    #[test]
    fn test_parse_negative() {
        assert_eq!(parse_duration("-5s").unwrap(), Duration::seconds(-5));
    }

    #[test]
    fn test_parse_rejects_unknown_unit() {
        assert_eq!(
            parse_duration("5d"),
            Err(DurationParseError::UnknownFormat("5d".to_string()))
        );
        assert!(matches!(
            parse_duration("abcs"),
            Err(DurationParseError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_format_picks_largest_exact_unit() {
        assert_eq!(format_duration(Duration::zero()), "0s");
        assert_eq!(format_duration(Duration::seconds(20)), "20s");
        assert_eq!(format_duration(Duration::milliseconds(1500)), "1500ms");
        assert_eq!(format_duration(Duration::microseconds(-250)), "-250us");
        assert_eq!(format_duration(Duration::nanoseconds(7)), "7ns");
    }

    #[test]
    fn test_format_then_parse_is_exact() {
        for d in [
            Duration::milliseconds(16_667),
            Duration::nanoseconds(16_666_666),
            Duration::seconds(-3),
        ] {
            assert_eq!(parse_duration(&format_duration(d)).unwrap(), d);
        }
    }
}
