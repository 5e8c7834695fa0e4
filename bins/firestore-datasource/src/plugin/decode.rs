use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, json};

use frame_engine::Value;

// ═══════════════════════════════════════════════════════════════
//  Documents: runQuery response items
// ═══════════════════════════════════════════════════════════════

/// One item of a `runQuery` response. Items without a document carry only
/// progress information.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RunQueryItem {
    #[serde(default)]
    pub document: Option<Document>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Document {
    /// `projects/{p}/databases/{d}/documents/{collection}/{id}`
    pub name: String,
    #[serde(default)]
    pub fields: Map<String, serde_json::Value>,
}

impl Document {
    pub fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Follow a dotted path through nested map values.
    pub fn lookup(&self, path: &[String]) -> Option<&serde_json::Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.fields.get(first)?;
        for segment in rest {
            current = current
                .get("mapValue")
                .and_then(|m| m.get("fields"))
                .and_then(|f| f.get(segment))?;
        }
        Some(current)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Typed value → frame value
// ═══════════════════════════════════════════════════════════════

/// Classify one Firestore typed value (`{"integerValue": "5"}`, ...).
/// Integers are 64-bit on the wire; maps, arrays and geo points stay whole.
pub(crate) fn decode_value(typed: &serde_json::Value) -> Value {
    let Some((tag, inner)) = single_entry(typed) else {
        return Value::display(typed);
    };
    match tag {
        "nullValue" => Value::Null,
        "booleanValue" => inner.as_bool().map(Value::Bool).unwrap_or_else(|| Value::display(inner)),
        "integerValue" => parse_integer(inner).map(Value::Int64).unwrap_or_else(|| Value::display(inner)),
        "doubleValue" => parse_double(inner).map(Value::Float64).unwrap_or_else(|| Value::display(inner)),
        "timestampValue" => match inner.as_str().and_then(parse_timestamp) {
            Some(ts) => Value::Timestamp(ts),
            None => Value::display(inner),
        },
        "stringValue" | "bytesValue" | "referenceValue" => match inner {
            serde_json::Value::String(s) => Value::String(s.clone()),
            other => Value::display(other),
        },
        "geoPointValue" | "arrayValue" | "mapValue" => Value::Structured(to_plain(typed)),
        _ => Value::display(typed),
    }
}

/// Strip Firestore typing from a value, recursively.
pub(crate) fn to_plain(typed: &serde_json::Value) -> serde_json::Value {
    let Some((tag, inner)) = single_entry(typed) else {
        return typed.clone();
    };
    match tag {
        "nullValue" => serde_json::Value::Null,
        "integerValue" => parse_integer(inner).map(|i| json!(i)).unwrap_or_else(|| inner.clone()),
        "doubleValue" => match parse_double(inner) {
            Some(f) if f.is_finite() => json!(f),
            _ => inner.clone(),
        },
        "booleanValue" | "timestampValue" | "stringValue" | "bytesValue" | "referenceValue" => inner.clone(),
        "geoPointValue" => json!({
            "latitude": inner.get("latitude").cloned().unwrap_or(json!(0.0)),
            "longitude": inner.get("longitude").cloned().unwrap_or(json!(0.0)),
        }),
        "arrayValue" => serde_json::Value::Array(
            inner
                .get("values")
                .and_then(|v| v.as_array())
                .map(|items| items.iter().map(to_plain).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => serde_json::Value::Object(
            inner
                .get("fields")
                .and_then(|f| f.as_object())
                .map(|fields| fields.iter().map(|(k, v)| (k.clone(), to_plain(v))).collect())
                .unwrap_or_default(),
        ),
        _ => typed.clone(),
    }
}

fn single_entry(typed: &serde_json::Value) -> Option<(&str, &serde_json::Value)> {
    let map = typed.as_object()?;
    if map.len() != 1 {
        return None;
    }
    map.iter().next().map(|(k, v)| (k.as_str(), v))
}

/// `int64` travels as a decimal string in proto3 JSON.
fn parse_integer(v: &serde_json::Value) -> Option<i64> {
    match v {
        serde_json::Value::String(s) => s.parse().ok(),
        other => other.as_i64(),
    }
}

fn parse_double(v: &serde_json::Value) -> Option<f64> {
    match v {
        serde_json::Value::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            other => other.parse().ok(),
        },
        other => other.as_f64(),
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|t| t.with_timezone(&Utc))
}
