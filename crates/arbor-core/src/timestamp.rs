//! Timestamps
//!
//! A `Timestamp` is a validated point in time that keeps the UTC offset it was
//! written with. It serializes as an RFC 3339 string and accepts a few older
//! layouts when parsing, so documents written by earlier versions still load.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Layouts accepted besides RFC 3339 and RFC 2822
const EXTRA_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f %z", "%Y-%m-%dT%H:%M:%S%.f%z"];

/// Errors produced while constructing a timestamp
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    #[error("Invalid timestamp string: '{0}'")]
    InvalidFormat(String),

    #[error("Timestamp out of range: {0} ms")]
    OutOfRange(i64),
}

/// A point in time with its original offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<FixedOffset>);

impl Timestamp {
    /// Current wall-clock time in UTC
    pub fn now() -> Self {
        Self(Utc::now().fixed_offset())
    }

    /// Build a timestamp from milliseconds since the Unix epoch
    pub fn from_millis(millis: i64) -> Result<Self, TimestampError> {
        Utc.timestamp_millis_opt(millis)
            .single()
            .map(|dt| Self(dt.fixed_offset()))
            .ok_or(TimestampError::OutOfRange(millis))
    }

    /// Parse a timestamp string
    ///
    /// Tries RFC 3339 first, then RFC 2822, then a couple of offset-bearing layouts,
    /// and finally a naive `YYYY-MM-DDTHH:MM:SS` which is read as UTC.
    pub fn parse(value: &str) -> Result<Self, TimestampError> {
        let value = value.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Ok(Self(dt));
        }
        if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
            return Ok(Self(dt));
        }
        for format in EXTRA_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(value, format) {
                return Ok(Self(dt));
            }
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
            return Ok(Self(naive.and_utc().fixed_offset()));
        }

        Err(TimestampError::InvalidFormat(value.to_string()))
    }

    /// Milliseconds since the Unix epoch
    pub fn as_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// The underlying chrono value
    pub fn as_datetime(&self) -> &DateTime<FixedOffset> {
        &self.0
    }

    /// Canonical string form (RFC 3339, millisecond precision)
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(chrono::SecondsFormat::Millis, false)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl FromStr for Timestamp {
    type Err = TimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value.fixed_offset())
    }
}

impl From<DateTime<FixedOffset>> for Timestamp {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Self(value)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_rfc3339())
    }
}

/// Reads a timestamp string or a number of milliseconds since the epoch
struct TimestampVisitor;

impl<'de> Visitor<'de> for TimestampVisitor {
    type Value = Timestamp;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a timestamp string or epoch milliseconds")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Timestamp, E> {
        Timestamp::parse(value).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Timestamp, E> {
        Timestamp::from_millis(value).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Timestamp, E> {
        let millis = i64::try_from(value)
            .map_err(|_| E::custom(format!("Timestamp out of range: {value} ms")))?;
        self.visit_i64(millis)
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Timestamp, E> {
        if !value.is_finite() || value.abs() >= i64::MAX as f64 {
            return Err(E::custom(format!("Timestamp out of range: {value} ms")));
        }
        self.visit_i64(value.trunc() as i64)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TimestampVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rfc3339_keeps_offset() {
        let ts = Timestamp::parse("2023-04-01T10:30:00+02:00").unwrap();
        assert_eq!(ts.as_datetime().offset().local_minus_utc(), 2 * 3600);
        assert_eq!(ts.to_rfc3339(), "2023-04-01T10:30:00.000+02:00");
    }

    #[test]
    fn test_parse_legacy_layouts() {
        let a = Timestamp::parse("Sat, 01 Apr 2023 08:30:00 +0000").unwrap();
        let b = Timestamp::parse("2023-04-01 08:30:00 +0000").unwrap();
        let c = Timestamp::parse("2023-04-01T08:30:00").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_millis(), c.as_millis());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = Timestamp::parse("yesterday-ish").unwrap_err();
        assert!(matches!(err, TimestampError::InvalidFormat(_)));
    }

    #[test]
    fn test_from_millis() {
        let ts = Timestamp::from_millis(1_680_337_800_000).unwrap();
        assert_eq!(ts.as_millis(), 1_680_337_800_000);
        assert!(Timestamp::from_millis(i64::MAX).is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let ts = Timestamp::from_millis(0).unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"1970-01-01T00:00:00.000+00:00\"");
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn test_deserialize_epoch_millis() {
        let ts: Timestamp = serde_json::from_str("1600000000000").unwrap();
        assert_eq!(ts.as_millis(), 1_600_000_000_000);
        assert_eq!(ts.to_rfc3339(), "2020-09-13T12:26:40.000+00:00");

        let negative: Timestamp = serde_json::from_str("-1000").unwrap();
        assert_eq!(negative.as_millis(), -1_000);

        assert!(serde_json::from_str::<Timestamp>("18446744073709551615").is_err());
        assert!(serde_json::from_str::<Timestamp>("true").is_err());
    }

    #[test]
    fn test_ordering() {
        let earlier = Timestamp::from_millis(1_000).unwrap();
        let later = Timestamp::from_millis(2_000).unwrap();
        assert!(earlier < later);
    }
}
