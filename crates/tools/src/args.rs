//! Argument extraction for tool calls.
//!
//! Models are loose with types: ids arrive as `"12"` as often as `12`, tags as
//! `"a, b"` as often as `["a", "b"]`. These helpers accept both and turn
//! anything else into [`ToolError::InvalidArguments`].

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use openloop_core::error::{StoreError, ToolError};
use serde_json::Value;
use std::str::FromStr;

fn invalid(message: impl Into<String>) -> ToolError {
    ToolError::InvalidArguments(message.into())
}

/// A non-empty string argument.
pub fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    optional_str(args, key).ok_or_else(|| invalid(format!("'{key}' is required")))
}

pub fn optional_i64(args: &Value, key: &str) -> Result<Option<i64>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| invalid(format!("'{key}' must be an integer"))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(format!("'{key}' must be an integer"))),
        Some(_) => Err(invalid(format!("'{key}' must be an integer"))),
    }
}

pub fn required_i64(args: &Value, key: &str) -> Result<i64, ToolError> {
    optional_i64(args, key)?.ok_or_else(|| invalid(format!("'{key}' is required")))
}

pub fn optional_bool(args: &Value, key: &str) -> Result<Option<bool>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::String(s)) => match s.trim() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            _ => Err(invalid(format!("'{key}' must be true or false"))),
        },
        Some(_) => Err(invalid(format!("'{key}' must be true or false"))),
    }
}

/// A result limit, defaulted and capped.
pub fn limit(args: &Value, default: usize, max: usize) -> Result<usize, ToolError> {
    match optional_i64(args, "limit")? {
        None => Ok(default),
        Some(n) if n < 1 => Err(invalid("'limit' must be at least 1")),
        Some(n) => Ok((n as usize).min(max)),
    }
}

/// Tags as an array of strings or a comma-separated string.
pub fn optional_tags(args: &Value, key: &str) -> Result<Option<Vec<String>>, ToolError> {
    let tags: Vec<String> = match args.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => s.split(',').map(str::to_string).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid(format!("'{key}' must contain only strings")))
            })
            .collect::<Result<_, _>>()?,
        Some(_) => return Err(invalid(format!("'{key}' must be a list of strings"))),
    };

    Ok(Some(
        tags.into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
    ))
}

/// One of the store's string enums (status, priority, category).
pub fn optional_enum<T>(args: &Value, key: &str) -> Result<Option<T>, ToolError>
where
    T: FromStr<Err = StoreError>,
{
    optional_str(args, key)
        .map(|s| s.to_lowercase().parse::<T>())
        .transpose()
        .map_err(|e| invalid(e.to_string()))
}

/// A calendar date: `YYYY-MM-DD`, or the date part of a datetime.
pub fn parse_date(text: &str) -> Result<NaiveDate, ToolError> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| parse_datetime(text).map(|at| at.with_timezone(&Local).date_naive()))
        .map_err(|_| invalid(format!("invalid date '{text}', expected YYYY-MM-DD")))
}

pub fn optional_date(args: &Value, key: &str) -> Result<Option<NaiveDate>, ToolError> {
    optional_str(args, key).map(parse_date).transpose()
}

/// A point in time: RFC 3339, or a local `YYYY-MM-DD HH:MM[:SS]` / `YYYY-MM-DD`.
pub fn parse_datetime(text: &str) -> Result<DateTime<Utc>, ToolError> {
    let text = text.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Ok(at.with_timezone(&Utc));
    }

    let naive = ["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| {
            invalid(format!(
                "invalid time '{text}', expected RFC 3339 or YYYY-MM-DD HH:MM"
            ))
        })?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|at| at.with_timezone(&Utc))
        .ok_or_else(|| invalid(format!("'{text}' does not exist in the local time zone")))
}

pub fn optional_datetime(args: &Value, key: &str) -> Result<Option<DateTime<Utc>>, ToolError> {
    optional_str(args, key).map(parse_datetime).transpose()
}
