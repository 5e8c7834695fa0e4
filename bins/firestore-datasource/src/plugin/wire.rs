use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;

use super::error::PluginError;

// ═══════════════════════════════════════════════════════════════
//  Collection reference
// ═══════════════════════════════════════════════════════════════

/// `users` or `users/abc/orders`, split into the parent document path and
/// the collection id the query selects from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CollectionRef {
    /// Document path relative to `.../documents`; empty for root collections.
    pub parent: String,
    pub collection_id: String,
}

impl CollectionRef {
    pub fn parse(path: &str) -> Result<Self, PluginError> {
        let segments: Vec<&str> = path
            .trim()
            .trim_matches('/')
            .split('/')
            .map(str::trim)
            .collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(PluginError::validation(format!("invalid collection path '{path}'")));
        }
        if segments.len() % 2 == 0 {
            return Err(PluginError::validation(format!(
                "collection path '{path}' points to a document, expected an odd number of segments",
            )));
        }
        let (collection_id, parent) = segments
            .split_last()
            .ok_or_else(|| PluginError::validation("collection path is empty"))?;
        Ok(Self {
            parent: parent.join("/"),
            collection_id: collection_id.to_string(),
        })
    }
}

impl std::fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.parent.is_empty() {
            f.write_str(&self.collection_id)
        } else {
            write!(f, "{}/{}", self.parent, self.collection_id)
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  StructuredQuery: Firestore REST v1 request body
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StructuredQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<Projection>,
    pub from: Vec<CollectionSelector>,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<Order>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i32>,
}

impl StructuredQuery {
    pub fn over(target: &CollectionRef) -> Self {
        Self {
            from: vec![CollectionSelector {
                collection_id: target.collection_id.clone(),
            }],
            ..Default::default()
        }
    }

    pub fn select<S: AsRef<str>>(&mut self, paths: impl IntoIterator<Item = S>) {
        let fields: Vec<FieldReference> = paths.into_iter().map(|p| FieldReference::new(p.as_ref())).collect();
        if !fields.is_empty() {
            self.select = Some(Projection { fields });
        }
    }

    /// Conjunction of all filters; a single filter is sent bare.
    pub fn filter_all(&mut self, mut filters: Vec<Filter>) {
        self.filter = match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(Filter::CompositeFilter {
                op: "AND",
                filters,
            }),
        };
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CollectionSelector {
    pub collection_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct Projection {
    pub fields: Vec<FieldReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FieldReference {
    pub field_path: String,
}

impl FieldReference {
    pub fn new(path: &str) -> Self {
        Self { field_path: quote_field_path(path) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct Order {
    pub field: FieldReference,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum Filter {
    CompositeFilter {
        op: &'static str,
        filters: Vec<Filter>,
    },
    FieldFilter {
        field: FieldReference,
        op: Operator,
        #[serde(serialize_with = "serialize_literal")]
        value: Literal,
    },
    UnaryFilter {
        op: UnaryOp,
        field: FieldReference,
    },
}

impl Filter {
    /// Comparison of `path` with `value`; `==`/`!=` against null become
    /// unary null checks.
    pub fn compare(path: &str, op: Operator, value: Literal) -> Result<Self, PluginError> {
        let field = FieldReference::new(path);
        let is_null = matches!(value, Literal::Null);
        let is_list = matches!(value, Literal::Array(_));
        match op {
            Operator::Equal if is_null => Ok(Filter::UnaryFilter { op: UnaryOp::IsNull, field }),
            Operator::NotEqual if is_null => Ok(Filter::UnaryFilter { op: UnaryOp::IsNotNull, field }),
            _ if is_null => Err(PluginError::validation(format!(
                "operator {} cannot compare '{path}' with null",
                op.symbol(),
            ))),
            _ if is_list && !op.takes_list() => Err(PluginError::validation(format!(
                "operator {} expects a single value for '{path}'",
                op.symbol(),
            ))),
            _ if op.takes_list() && !is_list => Ok(Filter::FieldFilter {
                field,
                op,
                value: Literal::Array(vec![value]),
            }),
            _ => Ok(Filter::FieldFilter { field, op, value }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum UnaryOp {
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum Operator {
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Equal,
    NotEqual,
    ArrayContains,
    In,
    ArrayContainsAny,
    NotIn,
}

impl Operator {
    /// Parse the query editor's operator spelling.
    pub fn parse(op: &str) -> Result<Self, PluginError> {
        Ok(match op.trim().to_ascii_lowercase().as_str() {
            "<" => Operator::LessThan,
            "<=" => Operator::LessThanOrEqual,
            ">" => Operator::GreaterThan,
            ">=" => Operator::GreaterThanOrEqual,
            "==" | "=" => Operator::Equal,
            "!=" | "<>" => Operator::NotEqual,
            "array-contains" => Operator::ArrayContains,
            "in" => Operator::In,
            "array-contains-any" => Operator::ArrayContainsAny,
            "not-in" => Operator::NotIn,
            other => return Err(PluginError::validation(format!("unsupported operator '{other}'"))),
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Operator::LessThan => "<",
            Operator::LessThanOrEqual => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqual => ">=",
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::ArrayContains => "array-contains",
            Operator::In => "in",
            Operator::ArrayContainsAny => "array-contains-any",
            Operator::NotIn => "not-in",
        }
    }

    pub fn takes_list(self) -> bool {
        matches!(self, Operator::In | Operator::NotIn | Operator::ArrayContainsAny)
    }

    /// Same comparison with operands swapped (`5 < x` is `x > 5`).
    pub fn flipped(self) -> Option<Self> {
        Some(match self {
            Operator::LessThan => Operator::GreaterThan,
            Operator::LessThanOrEqual => Operator::GreaterThanOrEqual,
            Operator::GreaterThan => Operator::LessThan,
            Operator::GreaterThanOrEqual => Operator::LessThanOrEqual,
            Operator::Equal | Operator::NotEqual => self,
            _ => return None,
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Literal: filter operand
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Literal {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Array(Vec<Literal>),
}

impl Literal {
    /// Convert an editor-supplied value using its `valueType` hint. Non-string
    /// JSON values are taken as they are.
    pub fn from_hint(raw: &serde_json::Value, hint: &str, list: bool) -> Result<Self, PluginError> {
        let hint = hint.trim().to_ascii_lowercase();
        match raw {
            serde_json::Value::String(text) if list => text
                .split(',')
                .map(|item| Self::parse_text(item.trim(), &hint))
                .collect::<Result<Vec<_>, _>>()
                .map(Literal::Array),
            serde_json::Value::String(text) => Self::parse_text(text, &hint),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| Self::from_hint(item, &hint, false))
                .collect::<Result<Vec<_>, _>>()
                .map(Literal::Array),
            other => Ok(Self::from_json(other)),
        }
    }

    fn parse_text(text: &str, hint: &str) -> Result<Self, PluginError> {
        let bad = |what: &str| PluginError::validation(format!("value '{text}' is not a valid {what}"));
        match hint {
            "" | "string" => Ok(Literal::String(text.to_string())),
            "number" => text
                .parse::<i64>()
                .map(Literal::Integer)
                .or_else(|_| text.parse::<f64>().map(Literal::Double))
                .map_err(|_| bad("number")),
            "integer" | "int" => text.parse::<i64>().map(Literal::Integer).map_err(|_| bad("integer")),
            "double" | "float" => text.parse::<f64>().map(Literal::Double).map_err(|_| bad("double")),
            "boolean" | "bool" => match text.to_ascii_lowercase().as_str() {
                "true" => Ok(Literal::Bool(true)),
                "false" => Ok(Literal::Bool(false)),
                _ => Err(bad("boolean")),
            },
            "timestamp" | "date" => DateTime::parse_from_rfc3339(text)
                .map(|t| Literal::Timestamp(t.with_timezone(&Utc)))
                .map_err(|_| bad("RFC 3339 timestamp")),
            "null" => Ok(Literal::Null),
            other => Err(PluginError::validation(format!("unsupported value type '{other}'"))),
        }
    }

    fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Literal::Null,
            serde_json::Value::Bool(b) => Literal::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Literal::Integer)
                .or_else(|| n.as_f64().map(Literal::Double))
                .unwrap_or_else(|| Literal::String(n.to_string())),
            serde_json::Value::String(s) => Literal::String(s.clone()),
            serde_json::Value::Array(items) => Literal::Array(items.iter().map(Self::from_json).collect()),
            serde_json::Value::Object(_) => Literal::String(value.to_string()),
        }
    }

    /// Firestore typed value, e.g. `{"integerValue": "5"}`.
    pub fn to_firestore(&self) -> serde_json::Value {
        match self {
            Literal::Null => json!({"nullValue": null}),
            Literal::Bool(b) => json!({"booleanValue": b}),
            Literal::Integer(i) => json!({"integerValue": i.to_string()}),
            Literal::Double(f) if f.is_finite() => json!({"doubleValue": f}),
            Literal::Double(f) if f.is_nan() => json!({"doubleValue": "NaN"}),
            Literal::Double(f) if *f > 0.0 => json!({"doubleValue": "Infinity"}),
            Literal::Double(_) => json!({"doubleValue": "-Infinity"}),
            Literal::String(s) => json!({"stringValue": s}),
            Literal::Timestamp(t) => {
                json!({"timestampValue": t.to_rfc3339_opts(SecondsFormat::AutoSi, true)})
            }
            Literal::Array(items) => json!({
                "arrayValue": {"values": items.iter().map(Literal::to_firestore).collect::<Vec<_>>()}
            }),
        }
    }
}

fn serialize_literal<S: serde::Serializer>(value: &Literal, serializer: S) -> Result<S::Ok, S::Error> {
    value.to_firestore().serialize(serializer)
}

// ═══════════════════════════════════════════════════════════════
//  Field paths
// ═══════════════════════════════════════════════════════════════

/// Quote each dot-separated segment that is not a simple identifier, as
/// Firestore field paths require.
pub(crate) fn quote_field_path(path: &str) -> String {
    path.split('.')
        .map(|segment| {
            let simple = segment
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if simple || is_quoted(segment) {
                segment.to_string()
            } else {
                format!("`{}`", segment.replace('\\', "\\\\").replace('`', "\\`"))
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

fn is_quoted(segment: &str) -> bool {
    segment.len() >= 2 && segment.starts_with('`') && segment.ends_with('`')
}
