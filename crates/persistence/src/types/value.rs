//! Typed field values and their JSON representation.
//!
//! Every column declared in a resource schema has a [`FieldKind`]. Values
//! read from storage are untyped (SQLite integers, text, JSON fragments);
//! the functions here convert them into [`FieldValue`]s by dispatching on
//! the declared kind, so decoding never depends on per-field code.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// The storage kind of a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// UTF-8 text.
    String,
    /// 64-bit signed integer.
    Integer,
    /// Boolean, stored as 0/1.
    Boolean,
    /// UTC timestamp, stored as RFC 3339 text.
    Timestamp,
    /// Structured value stored as JSON text.
    Json,
}

impl FieldKind {
    /// Returns `true` for kinds that may appear in equality filters.
    pub fn is_filterable(&self) -> bool {
        !matches!(self, FieldKind::Json)
    }

    /// Returns the SQLite column type used for this kind.
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldKind::String | FieldKind::Timestamp | FieldKind::Json => "TEXT",
            FieldKind::Integer | FieldKind::Boolean => "INTEGER",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Boolean => "boolean",
            FieldKind::Timestamp => "timestamp",
            FieldKind::Json => "json",
        };
        write!(f, "{}", name)
    }
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// No value stored.
    Null,
    /// Text value.
    String(String),
    /// Integer value.
    Integer(i64),
    /// Boolean value.
    Boolean(bool),
    /// Timestamp value.
    Timestamp(DateTime<Utc>),
    /// Structured value.
    Json(Value),
}

/// A value could not be converted to the requested kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    /// The kind that was requested.
    pub expected: FieldKind,
    /// What went wrong.
    pub message: String,
}

impl DecodeError {
    pub(crate) fn new(expected: FieldKind, message: impl Into<String>) -> Self {
        Self {
            expected,
            message: message.into(),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {}: {}", self.expected, self.message)
    }
}

impl std::error::Error for DecodeError {}

impl FieldValue {
    /// Returns the kind of this value, or `None` for `Null`.
    pub fn kind(&self) -> Option<FieldKind> {
        match self {
            FieldValue::Null => None,
            FieldValue::String(_) => Some(FieldKind::String),
            FieldValue::Integer(_) => Some(FieldKind::Integer),
            FieldValue::Boolean(_) => Some(FieldKind::Boolean),
            FieldValue::Timestamp(_) => Some(FieldKind::Timestamp),
            FieldValue::Json(_) => Some(FieldKind::Json),
        }
    }

    /// Returns `true` if this value is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Returns `true` if this value can be stored in a column of `kind`.
    pub fn matches_kind(&self, kind: FieldKind) -> bool {
        self.kind().is_none_or(|k| k == kind)
    }

    /// Returns the text value, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer value, if any.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the boolean value, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the timestamp value, if any.
    pub fn as_timestamp(&self) -> Option<&DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(t) => Some(t),
            _ => None,
        }
    }

    /// Returns the structured value, if any.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            FieldValue::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Converts this value to its JSON form.
    ///
    /// Timestamps are rendered as RFC 3339 strings with microsecond
    /// precision, the same text that is written to storage.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Boolean(b) => Value::Bool(*b),
            FieldValue::Timestamp(t) => Value::String(format_timestamp(t)),
            FieldValue::Json(v) => v.clone(),
        }
    }

    /// Decodes a JSON fragment into a value of the given kind.
    ///
    /// Used for values embedded in aggregated sub-select arrays, where
    /// SQLite has already turned every column into a JSON scalar. JSON
    /// columns arrive as their stored text and are parsed here.
    pub fn from_json(kind: FieldKind, value: &Value) -> Result<FieldValue, DecodeError> {
        if value.is_null() {
            return Ok(FieldValue::Null);
        }
        match kind {
            FieldKind::String => match value {
                Value::String(s) => Ok(FieldValue::String(s.clone())),
                Value::Number(n) => Ok(FieldValue::String(n.to_string())),
                Value::Bool(b) => Ok(FieldValue::String(b.to_string())),
                other => Err(DecodeError::new(kind, format!("got {}", other))),
            },
            FieldKind::Integer => match value {
                Value::Number(n) => n
                    .as_i64()
                    .map(FieldValue::Integer)
                    .ok_or_else(|| DecodeError::new(kind, format!("{} is out of range", n))),
                Value::String(s) => parse_integer(s),
                Value::Bool(b) => Ok(FieldValue::Integer(i64::from(*b))),
                other => Err(DecodeError::new(kind, format!("got {}", other))),
            },
            FieldKind::Boolean => match value {
                Value::Bool(b) => Ok(FieldValue::Boolean(*b)),
                Value::Number(n) => match n.as_i64() {
                    Some(i) => Ok(FieldValue::Boolean(i != 0)),
                    None => Err(DecodeError::new(kind, format!("got {}", n))),
                },
                Value::String(s) => parse_boolean(s),
                other => Err(DecodeError::new(kind, format!("got {}", other))),
            },
            FieldKind::Timestamp => match value {
                Value::String(s) => parse_timestamp(s),
                other => Err(DecodeError::new(kind, format!("got {}", other))),
            },
            FieldKind::Json => match value {
                Value::String(s) => parse_json_text(s),
                other => Ok(FieldValue::Json(other.clone())),
            },
        }
    }

    /// Parses a filter value supplied as text into the given kind.
    pub fn parse(kind: FieldKind, text: &str) -> Result<FieldValue, DecodeError> {
        match kind {
            FieldKind::String => Ok(FieldValue::String(text.to_string())),
            FieldKind::Integer => parse_integer(text),
            FieldKind::Boolean => parse_boolean(text),
            FieldKind::Timestamp => parse_timestamp(text),
            FieldKind::Json => parse_json_text(text),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Integer(i)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Boolean(b)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(t: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(t)
    }
}

impl From<Value> for FieldValue {
    fn from(v: Value) -> Self {
        FieldValue::Json(v)
    }
}

/// Formats a timestamp the way it is stored.
pub fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_integer(text: &str) -> Result<FieldValue, DecodeError> {
    text.trim()
        .parse::<i64>()
        .map(FieldValue::Integer)
        .map_err(|e| DecodeError::new(FieldKind::Integer, e.to_string()))
}

fn parse_boolean(text: &str) -> Result<FieldValue, DecodeError> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(FieldValue::Boolean(true)),
        "false" | "0" => Ok(FieldValue::Boolean(false)),
        other => Err(DecodeError::new(
            FieldKind::Boolean,
            format!("'{}' is not a boolean", other),
        )),
    }
}

fn parse_timestamp(text: &str) -> Result<FieldValue, DecodeError> {
    if text.is_empty() {
        return Ok(FieldValue::Null);
    }
    DateTime::parse_from_rfc3339(text)
        .map(|t| FieldValue::Timestamp(t.with_timezone(&Utc)))
        .map_err(|e| DecodeError::new(FieldKind::Timestamp, e.to_string()))
}

fn parse_json_text(text: &str) -> Result<FieldValue, DecodeError> {
    if text.is_empty() {
        return Ok(FieldValue::Null);
    }
    serde_json::from_str(text)
        .map(FieldValue::Json)
        .map_err(|e| DecodeError::new(FieldKind::Json, e.to_string()))
}
