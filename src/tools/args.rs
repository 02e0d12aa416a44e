//! Argument extraction for tool calls
//!
//! Tool arguments are camelCase JSON. Anything malformed becomes an
//! `InvalidArgument`, which the server reports as invalid params.

use std::str::FromStr;

use serde_json::Value;

use crate::query::QueryLimits;
use crate::types::{EventKind, Pagination, TimeRange, Timestamp, UnknownVariant};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid argument: {0}")]
pub struct InvalidArgument(pub String);

impl From<UnknownVariant> for InvalidArgument {
    fn from(err: UnknownVariant) -> Self {
        InvalidArgument(err.to_string())
    }
}

pub type ArgResult<T> = Result<T, InvalidArgument>;

pub fn required_str<'a>(params: &'a Value, key: &str) -> ArgResult<&'a str> {
    match params.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s),
        Some(Value::String(_)) => Err(InvalidArgument(format!("{key} must not be empty"))),
        Some(_) => Err(InvalidArgument(format!("{key} must be a string"))),
        None => Err(InvalidArgument(format!("missing {key}"))),
    }
}

/// Absent, null and empty strings all read as `None`
pub fn optional_str<'a>(params: &'a Value, key: &str) -> ArgResult<Option<&'a str>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(InvalidArgument(format!("{key} must be a string"))),
    }
}

pub fn optional_usize(params: &Value, key: &str) -> ArgResult<Option<usize>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| InvalidArgument(format!("{key} must be a non-negative integer"))),
    }
}

pub fn bool_or(params: &Value, key: &str, default: bool) -> ArgResult<bool> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(InvalidArgument(format!("{key} must be a boolean"))),
    }
}

pub fn parse_enum<T>(params: &Value, key: &str) -> ArgResult<Option<T>>
where
    T: FromStr<Err = UnknownVariant>,
{
    optional_str(params, key)?
        .map(|s| s.parse::<T>().map_err(InvalidArgument::from))
        .transpose()
}

pub fn required_enum<T>(params: &Value, key: &str) -> ArgResult<T>
where
    T: FromStr<Err = UnknownVariant>,
{
    Ok(required_str(params, key)?.parse::<T>()?)
}

/// A list of wire names, also accepting a single string
pub fn enum_list<T>(params: &Value, key: &str) -> ArgResult<Vec<T>>
where
    T: FromStr<Err = UnknownVariant>,
{
    match params.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s.parse::<T>()?]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .ok_or_else(|| InvalidArgument(format!("{key} must contain strings")))?
                    .parse::<T>()
                    .map_err(InvalidArgument::from)
            })
            .collect(),
        Some(_) => Err(InvalidArgument(format!("{key} must be an array of strings"))),
    }
}

pub fn kinds(params: &Value, key: &str) -> ArgResult<Vec<EventKind>> {
    enum_list(params, key)
}

/// RFC 3339 text or integer epoch milliseconds
pub fn optional_timestamp(params: &Value, key: &str) -> ArgResult<Option<Timestamp>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => Timestamp::from_json(v)
            .map(Some)
            .map_err(|e| InvalidArgument(format!("{key}: {e}"))),
    }
}

pub fn required_timestamp(params: &Value, key: &str) -> ArgResult<Timestamp> {
    optional_timestamp(params, key)?.ok_or_else(|| InvalidArgument(format!("missing {key}")))
}

pub fn time_range(params: &Value) -> ArgResult<TimeRange> {
    Ok(TimeRange::new(
        optional_timestamp(params, "startTime")?,
        optional_timestamp(params, "endTime")?,
    ))
}

pub fn pagination(params: &Value, limits: QueryLimits) -> ArgResult<Pagination> {
    let page = optional_usize(params, "page")?.unwrap_or(0);
    let page_size = optional_usize(params, "pageSize")?.unwrap_or(limits.default_page_size);
    Ok(Pagination::new(page, page_size))
}
