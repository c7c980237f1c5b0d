use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{Error as _, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::record::Record;

/// Canonical field value.
///
/// - Scalars (Int64, Float64, Bool): as loaded by the source
/// - Timestamp: already-parsed instant (parquet timestamp columns,
///   inferred CSV date-times, stamped fields)
/// - List, Map: nested values from JSON-like sources
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    List(Vec<Value>),
    Map(Record),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int64(_) => "int64",
            Value::Float64(_) => "float64",
            Value::String(_) => "string",
            Value::Timestamp(_) => "timestamp",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int64(n) => write!(f, "{n}"),
            Value::Float64(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::Timestamp(ts) => f.write_str(&format_rfc3339(ts)),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(record) => write!(f, "{{{} fields}}", record.len()),
        }
    }
}

/// RFC 3339 with microsecond precision and `Z` suffix.
pub fn format_rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int64(n) => serializer.serialize_i64(*n),
            Value::Float64(n) => {
                // serde_json would silently turn NaN/inf into null
                if !n.is_finite() {
                    return Err(S::Error::custom(format!("non-finite float {n} is not serializable")));
                }
                serializer.serialize_f64(*n)
            }
            Value::String(s) => serializer.serialize_str(s),
            Value::Timestamp(ts) => serializer.serialize_str(&format_rfc3339(ts)),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(record) => record.serialize(serializer),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int64(i),
                // u64 above i64::MAX and all fractional numbers
                None => Value::Float64(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => Value::Map(Record::from_json_map(map)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int64(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float64(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Value::Timestamp(ts)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn timestamps_serialize_as_rfc3339() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let json = serde_json::to_string(&Value::Timestamp(ts)).unwrap();
        assert_eq!(json, "\"2024-03-01T12:30:00.000000Z\"");
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        assert!(serde_json::to_string(&Value::Float64(f64::NAN)).is_err());
        assert!(serde_json::to_string(&Value::Float64(f64::INFINITY)).is_err());
        assert_eq!(serde_json::to_string(&Value::Float64(1.5)).unwrap(), "1.5");
    }

    #[test]
    fn json_numbers_keep_integer_type() {
        assert_eq!(Value::from(serde_json::json!(42)), Value::Int64(42));
        assert_eq!(Value::from(serde_json::json!(0.25)), Value::Float64(0.25));
        assert_eq!(
            Value::from(serde_json::json!([1, "a", null])),
            Value::List(vec![Value::Int64(1), Value::from("a"), Value::Null])
        );
    }
}
