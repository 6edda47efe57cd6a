//! Value types for sqlsource
//!
//! Backend-neutral scalars and rows:
//! - Integers keep the width the backend reported so they bind back
//!   into keyset predicates with the column's own type
//! - Text may arrive as raw bytes; drivers normalize it in `transform`
//! - Values serialize as plain JSON scalars for object properties

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// SQL value type that can hold any scanned column value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Boolean value
    Bool(bool),
    /// 16-bit signed integer (SMALLINT)
    Int16(i16),
    /// 32-bit signed integer (INTEGER)
    Int32(i32),
    /// 64-bit signed integer (BIGINT)
    Int64(i64),
    /// 64-bit unsigned integer (BIGINT UNSIGNED)
    UInt64(u64),
    /// 32-bit floating point (REAL, FLOAT)
    Float32(f32),
    /// 64-bit floating point (DOUBLE PRECISION)
    Float64(f64),
    /// Arbitrary precision decimal (NUMERIC, DECIMAL)
    Decimal(Decimal),
    /// Text string (VARCHAR, TEXT, CHAR)
    String(String),
    /// Binary data, or text not yet decoded by the driver
    Bytes(Vec<u8>),
    /// Date without time (DATE)
    Date(NaiveDate),
    /// Time without date (TIME)
    Time(NaiveTime),
    /// Timestamp without timezone (TIMESTAMP, DATETIME)
    DateTime(NaiveDateTime),
    /// Timestamp with timezone (TIMESTAMPTZ)
    DateTimeTz(DateTime<Utc>),
    /// UUID
    Uuid(Uuid),
    /// JSON document
    Json(serde_json::Value),
}

impl Value {
    /// Check if value is NULL
    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Try to convert to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int16(n) => Some(i64::from(*n)),
            Self::Int32(n) => Some(i64::from(*n)),
            Self::Int64(n) => Some(*n),
            Self::UInt64(n) => i64::try_from(*n).ok(),
            Self::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Try to borrow as str
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Try to borrow as bytes
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b.as_slice()),
            Self::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Convert to a JSON value
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Int16(n) => Json::from(*n),
            Self::Int32(n) => Json::from(*n),
            Self::Int64(n) => Json::from(*n),
            Self::UInt64(n) => Json::from(*n),
            Self::Float32(n) => serde_json::Number::from_f64(f64::from(*n))
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Self::Float64(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Self::Json(j) => j.clone(),
            other => Json::String(other.to_string()),
        }
    }
}

/// Renders the value the way record identities are built
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int16(n) => write!(f, "{}", n),
            Self::Int32(n) => write!(f, "{}", n),
            Self::Int64(n) => write!(f, "{}", n),
            Self::UInt64(n) => write!(f, "{}", n),
            Self::Float32(n) => write!(f, "{}", n),
            Self::Float64(n) => write!(f, "{}", n),
            Self::Decimal(d) => write!(f, "{}", d),
            Self::String(s) => f.write_str(s),
            Self::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            Self::Date(d) => write!(f, "{}", d),
            Self::Time(t) => write!(f, "{}", t),
            Self::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.f")),
            Self::DateTimeTz(dt) => write!(f, "{}", dt.to_rfc3339()),
            Self::Uuid(u) => write!(f, "{}", u),
            Self::Json(j) => write!(f, "{}", j),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Self::Int16(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::UInt64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Self::Decimal(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Self::Null,
        }
    }
}

/// Database row as ordered column values
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Create a new row
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Build a row from `(column, value)` pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let (columns, values) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self { columns, values }
    }

    /// Get column count
    #[inline]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if row is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Get column names
    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Get all values
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Get value by column name.
    ///
    /// An exact match wins; otherwise the first case-insensitive match is
    /// used. Postgres allows both `"ID"` and `id` in one table.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == name)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(name)))
            .and_then(|idx| self.values.get(idx))
    }

    /// Rewrite every value in place, keeping column order
    pub fn map_values(mut self, f: impl Fn(Value) -> Value) -> Self {
        self.values = self.values.into_iter().map(f).collect();
        self
    }

    /// Convert row to HashMap
    pub fn into_map(self) -> HashMap<String, Value> {
        self.columns.into_iter().zip(self.values).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Int32(3).to_string(), "3");
        assert_eq!(Value::UInt64(18).to_string(), "18");
        assert_eq!(Value::from("abc").to_string(), "abc");
        assert_eq!(Value::Bytes(b"raw".to_vec()).to_string(), "raw");
        assert_eq!(Value::Null.to_string(), "null");
    }

    #[test]
    fn test_value_to_json() {
        assert_eq!(Value::Int64(7).to_json(), serde_json::json!(7));
        assert_eq!(Value::from("x").to_json(), serde_json::json!("x"));
        assert_eq!(Value::Float64(f64::NAN).to_json(), serde_json::Value::Null);

        let date = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(Value::Date(date).to_json(), serde_json::json!("2024-01-31"));
    }

    #[test]
    fn test_value_serializes_as_scalar() {
        let json = serde_json::to_string(&Value::Bool(true)).unwrap();
        assert_eq!(json, "true");
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::Int16(5).as_i64(), Some(5));
        assert_eq!(Value::UInt64(u64::MAX).as_i64(), None);
        assert_eq!(Value::from("hi").as_str(), Some("hi"));
        assert_eq!(Value::from(b"hi".to_vec()).as_bytes(), Some(&b"hi"[..]));
        assert!(Value::from(None::<i32>).is_null());
    }

    #[test]
    fn test_row_operations() {
        let row = Row::from_pairs([("id", Value::Int32(1)), ("name", Value::from("Alice"))]);

        assert_eq!(row.len(), 2);
        assert_eq!(row.get_by_name("NAME"), Some(&Value::from("Alice")));
        assert_eq!(row.get_by_name("missing"), None);

        let map = row.into_map();
        assert_eq!(map.get("id"), Some(&Value::Int32(1)));
    }

    #[test]
    fn test_get_by_name_prefers_exact_match() {
        let row = Row::from_pairs([("ID", Value::Int32(100)), ("id", Value::Int32(1))]);
        assert_eq!(row.get_by_name("id"), Some(&Value::Int32(1)));
        assert_eq!(row.get_by_name("ID"), Some(&Value::Int32(100)));
        assert_eq!(row.get_by_name("Id"), Some(&Value::Int32(100)));
    }

    #[test]
    fn test_row_map_values() {
        let row = Row::from_pairs([("a", Value::Int32(1))])
            .map_values(|v| Value::Int64(v.as_i64().unwrap_or_default() + 1));
        assert_eq!(row.values(), &[Value::Int64(2)]);
    }
}
