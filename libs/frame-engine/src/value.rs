use chrono::{DateTime, Utc};

use crate::kind::Kind;

/// Dynamically-typed cell value as produced by a row source.
///
/// Strategy by type:
/// - Scalars (Bool, Int32, Int64, Float64, Timestamp): stored natively
/// - String: owned text, also the target of the generic stringifier
/// - Structured: nested object/array, kept whole and encoded as JSON text
///   when it lands in a column
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Timestamp(DateTime<Utc>),
    String(String),
    Structured(serde_json::Value),
}

impl Value {
    /// Semantic kind of this value. Total; `Null` defers to the column.
    pub fn kind(&self) -> Kind {
        match self {
            Value::Null => Kind::Null,
            Value::Bool(_) => Kind::Bool,
            Value::Int32(_) => Kind::Int32,
            Value::Int64(_) => Kind::Int64,
            Value::Float64(_) => Kind::Float64,
            Value::Timestamp(_) => Kind::Timestamp,
            Value::String(_) => Kind::String,
            Value::Structured(_) => Kind::Structured,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Generic stringifier for anything that has no native representation.
    pub fn display(value: impl std::fmt::Display) -> Self {
        Value::String(value.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════
//  Classification of plain JSON
// ═══════════════════════════════════════════════════════════════

impl From<serde_json::Value> for Value {
    /// Integers pick the narrowest fixed width that holds them; unsigned
    /// values beyond `i64::MAX` fall back to `Float64`.
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    match i32::try_from(i) {
                        Ok(small) => Value::Int32(small),
                        Err(_) => Value::Int64(i),
                    }
                } else {
                    n.as_f64().map(Value::Float64).unwrap_or_else(|| Value::display(n))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            nested @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
                Value::Structured(nested)
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
