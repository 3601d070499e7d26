//! Timestamp handling for identity responses.
//!
//! Identity backends disagree on the format of token expiry: some send RFC 3339
//! with an offset (`2014-02-03T18:20:06.000-06:00`), others a bare timestamp
//! (`2015-03-23T20:49:31.000000`) that is implicitly UTC.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serializer};

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse an identity timestamp, treating offset-less values as UTC
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Serde adapter for `Option<DateTime<Utc>>` fields using [`parse_timestamp`]
pub mod optional {
    use super::*;

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_some(&dt.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(s) => parse_timestamp(&s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_rfc3339_with_offset() {
        let dt = parse_timestamp("2014-02-03T18:20:06.000-06:00").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2014, 2, 4, 0, 20, 6).unwrap());
    }

    #[test]
    fn test_parse_naive_as_utc() {
        let dt = parse_timestamp("2015-03-23T20:49:31.000000").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2015, 3, 23, 20, 49, 31).unwrap());
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_timestamp("tomorrow").is_none());
    }
}
