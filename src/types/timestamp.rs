//! Sub-second event timestamps

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::utils::time::{format_micros, now_micros, parse_datetime_micros};

/// Error for unparseable timestamps
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid timestamp '{0}': expected RFC 3339 or epoch milliseconds")]
pub struct TimestampError(pub String);

/// Point in time with microsecond precision (UTC)
///
/// Serializes as an RFC 3339 string. Deserializes from an RFC 3339 string or
/// an integer number of epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis.saturating_mul(1_000))
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * 1_000_000.0).round() as i64)
    }

    pub fn now() -> Self {
        Self(now_micros())
    }

    pub const fn as_micros(&self) -> i64 {
        self.0
    }

    pub fn to_rfc3339(&self) -> String {
        format_micros(self.0)
    }

    /// Parse RFC 3339 text or a plain integer of epoch milliseconds
    pub fn parse(text: &str) -> Result<Self, TimestampError> {
        let trimmed = text.trim();
        if let Ok(millis) = trimmed.parse::<i64>() {
            return Ok(Self::from_millis(millis));
        }
        parse_datetime_micros(trimmed)
            .map(Self)
            .ok_or_else(|| TimestampError(text.to_string()))
    }

    /// Interpret a JSON argument: string or integer milliseconds
    pub fn from_json(value: &serde_json::Value) -> Result<Self, TimestampError> {
        match value {
            serde_json::Value::String(s) => Self::parse(s),
            serde_json::Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(ms), _) => Ok(Self::from_millis(ms)),
                (None, Some(ms)) => Ok(Self::from_micros((ms * 1_000.0).round() as i64)),
                _ => Err(TimestampError(n.to_string())),
            },
            other => Err(TimestampError(other.to_string())),
        }
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

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(serde::de::Error::custom)
    }
}
