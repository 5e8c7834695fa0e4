use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::ConvertError;
use crate::kind::Kind;
use crate::value::Value;

// ═══════════════════════════════════════════════════════════════
//  ColumnValues: one homogeneous array per kind
// ═══════════════════════════════════════════════════════════════

/// Homogeneous storage for one column. Exactly one representation is live
/// at any time; `Structured` holds encoded JSON text.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Bool(Vec<bool>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float64(Vec<f64>),
    Timestamp(Vec<DateTime<Utc>>),
    String(Vec<String>),
    Structured(Vec<String>),
}

const STRUCTURED_PLACEHOLDER: &str = "null";

impl Default for ColumnValues {
    fn default() -> Self {
        ColumnValues::String(Vec::new())
    }
}

impl ColumnValues {
    /// Empty array of `kind`. `Null` has no storage of its own and maps to
    /// `String`.
    pub fn empty(kind: Kind) -> Self {
        match kind {
            Kind::Bool => ColumnValues::Bool(Vec::new()),
            Kind::Int32 => ColumnValues::Int32(Vec::new()),
            Kind::Int64 => ColumnValues::Int64(Vec::new()),
            Kind::Float64 => ColumnValues::Float64(Vec::new()),
            Kind::Timestamp => ColumnValues::Timestamp(Vec::new()),
            Kind::Null | Kind::String => ColumnValues::String(Vec::new()),
            Kind::Structured => ColumnValues::Structured(Vec::new()),
        }
    }

    /// `len` placeholders of `kind`.
    pub fn placeholders(kind: Kind, len: usize) -> Self {
        let mut values = Self::empty(kind);
        for _ in 0..len {
            values.push_placeholder();
        }
        values
    }

    pub fn kind(&self) -> Kind {
        match self {
            ColumnValues::Bool(_) => Kind::Bool,
            ColumnValues::Int32(_) => Kind::Int32,
            ColumnValues::Int64(_) => Kind::Int64,
            ColumnValues::Float64(_) => Kind::Float64,
            ColumnValues::Timestamp(_) => Kind::Timestamp,
            ColumnValues::String(_) => Kind::String,
            ColumnValues::Structured(_) => Kind::Structured,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Bool(v) => v.len(),
            ColumnValues::Int32(v) => v.len(),
            ColumnValues::Int64(v) => v.len(),
            ColumnValues::Float64(v) => v.len(),
            ColumnValues::Timestamp(v) => v.len(),
            ColumnValues::String(v) | ColumnValues::Structured(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append the kind's placeholder: false, zero, the Unix epoch, empty
    /// text, or JSON `null` for structured columns.
    pub fn push_placeholder(&mut self) {
        match self {
            ColumnValues::Bool(v) => v.push(false),
            ColumnValues::Int32(v) => v.push(0),
            ColumnValues::Int64(v) => v.push(0),
            ColumnValues::Float64(v) => v.push(0.0),
            ColumnValues::Timestamp(v) => v.push(DateTime::<Utc>::default()),
            ColumnValues::String(v) => v.push(String::new()),
            ColumnValues::Structured(v) => v.push(STRUCTURED_PLACEHOLDER.to_string()),
        }
    }

    /// Append a value the current kind absorbs. Narrower numerics are cast
    /// up; a String column takes the text of anything.
    pub fn push(&mut self, value: Value) -> Result<(), ConvertError> {
        let kind = self.kind();
        match (self, value) {
            (values, Value::Null) => values.push_placeholder(),
            (ColumnValues::Bool(v), Value::Bool(b)) => v.push(b),
            (ColumnValues::Int32(v), Value::Int32(i)) => v.push(i),
            (ColumnValues::Int64(v), Value::Int32(i)) => v.push(i64::from(i)),
            (ColumnValues::Int64(v), Value::Int64(i)) => v.push(i),
            (ColumnValues::Float64(v), Value::Int32(i)) => v.push(f64::from(i)),
            (ColumnValues::Float64(v), Value::Int64(i)) => v.push(i as f64),
            (ColumnValues::Float64(v), Value::Float64(f)) => v.push(f),
            (ColumnValues::Timestamp(v), Value::Timestamp(t)) => v.push(t),
            (ColumnValues::Structured(v), Value::Structured(s)) => v.push(encode_structured(&s)?),
            (ColumnValues::String(v), other) => v.push(value_text(&other)?),
            (_, other) => {
                return Err(ConvertError::KindMismatch {
                    column: String::new(),
                    kind,
                    value: other.kind(),
                });
            }
        }
        Ok(())
    }

    /// Text of the element at `idx`, as the String fallback renders it.
    fn text_at(&self, idx: usize) -> String {
        match self {
            ColumnValues::Bool(v) => v[idx].to_string(),
            ColumnValues::Int32(v) => v[idx].to_string(),
            ColumnValues::Int64(v) => v[idx].to_string(),
            ColumnValues::Float64(v) => v[idx].to_string(),
            ColumnValues::Timestamp(v) => timestamp_text(&v[idx]),
            ColumnValues::String(v) | ColumnValues::Structured(v) => v[idx].clone(),
        }
    }

    /// Re-encode every element as `target`. Slots flagged in `nulls` become
    /// the target's placeholder instead of the old placeholder's image.
    ///
    /// Only casts the promotion lattice allows are meaningful: numeric
    /// widening, or anything to `String`.
    pub fn cast(self, target: Kind, nulls: &[bool]) -> ColumnValues {
        if self.kind() == target {
            return self;
        }
        match (self, target) {
            (ColumnValues::Int32(v), Kind::Int64) => {
                ColumnValues::Int64(v.into_iter().map(i64::from).collect())
            }
            (ColumnValues::Int32(v), Kind::Float64) => {
                ColumnValues::Float64(v.into_iter().map(f64::from).collect())
            }
            (ColumnValues::Int64(v), Kind::Float64) => {
                ColumnValues::Float64(v.into_iter().map(|i| i as f64).collect())
            }
            (values, _) => ColumnValues::String(
                (0..values.len())
                    .map(|idx| {
                        if nulls.get(idx).copied().unwrap_or(false) {
                            String::new()
                        } else {
                            values.text_at(idx)
                        }
                    })
                    .collect(),
            ),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Text rendering
// ═══════════════════════════════════════════════════════════════

fn timestamp_text(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn encode_structured(value: &serde_json::Value) -> Result<String, ConvertError> {
    serde_json::to_string(value).map_err(|source| ConvertError::Encoding {
        column: String::new(),
        source,
    })
}

/// Text of a single value. Null renders as empty text.
pub fn value_text(value: &Value) -> Result<String, ConvertError> {
    Ok(match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Int32(i) => i.to_string(),
        Value::Int64(i) => i.to_string(),
        Value::Float64(f) => f.to_string(),
        Value::Timestamp(t) => timestamp_text(t),
        Value::String(s) => s.clone(),
        Value::Structured(s) => encode_structured(s)?,
    })
}

// ═══════════════════════════════════════════════════════════════
//  ColumnAccumulator: promotion state machine
// ═══════════════════════════════════════════════════════════════

/// Per-column state while rows stream in.
///
/// A column that has only seen nulls carries a provisional `String` kind;
/// the first real value re-seeds it with its own kind, so nulls never decide
/// the final representation.
#[derive(Debug)]
pub struct ColumnAccumulator {
    name: String,
    values: ColumnValues,
    nulls: Vec<bool>,
    provisional: bool,
}

impl ColumnAccumulator {
    /// A column with no values yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::empty(Kind::String),
            nulls: Vec::new(),
            provisional: true,
        }
    }

    /// A column first seen after `rows` rows, left-padded with placeholders.
    pub fn padded(name: impl Into<String>, rows: usize) -> Self {
        let mut acc = Self::new(name);
        acc.pad_to(rows);
        acc
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> Kind {
        self.values.kind()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn push(&mut self, value: Value) -> Result<(), ConvertError> {
        let incoming = value.kind();
        if incoming == Kind::Null {
            self.push_null();
            return Ok(());
        }

        if self.provisional {
            if self.values.kind() != incoming {
                self.values = ColumnValues::placeholders(incoming, self.values.len());
            }
            self.provisional = false;
        } else {
            let current = self.values.kind();
            if !current.absorbs(incoming) {
                self.promote(current.join(incoming));
            }
        }

        self.values
            .push(value)
            .map_err(|e| e.in_column(&self.name))?;
        self.nulls.push(false);
        Ok(())
    }

    pub fn push_null(&mut self) {
        self.values.push_placeholder();
        self.nulls.push(true);
    }

    /// Append placeholders until the column holds `rows` entries.
    pub fn pad_to(&mut self, rows: usize) {
        while self.values.len() < rows {
            self.push_null();
        }
    }

    fn promote(&mut self, target: Kind) {
        tracing::trace!(column = %self.name, from = %self.values.kind(), to = %target, "promote column");
        let values = std::mem::take(&mut self.values);
        self.values = values.cast(target, &self.nulls);
    }

    pub fn finish(self) -> Column {
        Column {
            name: self.name,
            values: self.values,
            nulls: self.nulls,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Column: finished, read-only
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: ColumnValues,
    /// `true` where the slot holds a placeholder rather than a real value.
    pub nulls: Vec<bool>,
}

impl Column {
    pub fn kind(&self) -> Kind {
        self.values.kind()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_null(&self, idx: usize) -> bool {
        self.nulls.get(idx).copied().unwrap_or(false)
    }
}
