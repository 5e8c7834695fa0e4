use std::collections::HashMap;

use crate::column::{Column, ColumnAccumulator};
use crate::error::ConvertError;
use crate::value::Value;

// ═══════════════════════════════════════════════════════════════
//  Row: one record from a row source
// ═══════════════════════════════════════════════════════════════

/// One result record.
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    /// Column name / value pairs, in the order the source produced them.
    Named(Vec<(String, Value)>),
    /// Values matched by position against the declared column manifest.
    Positional(Vec<Value>),
}

impl Row {
    pub fn named<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Row::Named(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn positional<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Row::Positional(values.into_iter().map(Into::into).collect())
    }
}

// ═══════════════════════════════════════════════════════════════
//  FrameBuilder: accumulators in column order
// ═══════════════════════════════════════════════════════════════

/// Streams rows into per-column accumulators and assembles the frame.
///
/// After every row, every column holds exactly `rows` entries: columns that
/// appear late are left-padded, columns missing from a row get a
/// placeholder.
#[derive(Debug)]
pub struct FrameBuilder {
    name: String,
    columns: Vec<ColumnAccumulator>,
    index: HashMap<String, usize>,
    /// Declared position → column slot.
    manifest: Vec<usize>,
    rows: usize,
}

impl FrameBuilder {
    /// Columns in first-seen order.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            index: HashMap::new(),
            manifest: Vec::new(),
            rows: 0,
        }
    }

    /// Columns in declared order; every declared column is present in the
    /// frame even if no row ever carries it.
    pub fn with_manifest<S: Into<String>>(
        name: impl Into<String>,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        let mut builder = Self::new(name);
        for column in columns {
            let column = column.into();
            let slot = builder.slot(column);
            builder.manifest.push(slot);
        }
        builder
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(ColumnAccumulator::name)
    }

    pub fn push_row(&mut self, row: Row) -> Result<(), ConvertError> {
        match row {
            Row::Named(pairs) => {
                for (name, value) in pairs {
                    let slot = self.slot(name);
                    self.push_value(slot, value)?;
                }
            }
            Row::Positional(values) => {
                for (pos, value) in values.into_iter().enumerate() {
                    let slot = match self.manifest.get(pos) {
                        Some(&slot) => slot,
                        None => self.slot(format!("col{pos}")),
                    };
                    self.push_value(slot, value)?;
                }
            }
        }

        self.rows += 1;
        for column in &mut self.columns {
            column.pad_to(self.rows);
        }
        Ok(())
    }

    pub fn finish(self) -> Frame {
        tracing::debug!(
            frame = %self.name,
            rows = self.rows,
            columns = self.columns.len(),
            "frame assembled"
        );
        Frame {
            name: self.name,
            columns: self.columns.into_iter().map(ColumnAccumulator::finish).collect(),
            rows: self.rows,
        }
    }

    /// Look up a column, creating it padded to the rows seen so far.
    fn slot(&mut self, name: String) -> usize {
        if let Some(&slot) = self.index.get(&name) {
            return slot;
        }
        let slot = self.columns.len();
        self.columns.push(ColumnAccumulator::padded(name.clone(), self.rows));
        self.index.insert(name, slot);
        slot
    }

    fn push_value(&mut self, slot: usize, value: Value) -> Result<(), ConvertError> {
        let column = &mut self.columns[slot];
        if column.len() > self.rows {
            // first occurrence within the row wins
            tracing::warn!(column = %column.name(), row = self.rows, "duplicate column in row, ignoring");
            return Ok(());
        }
        column.push(value)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Frame: column-oriented result of one query
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub name: String,
    pub columns: Vec<Column>,
    rows: usize,
}

impl Frame {
    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnValues;
    use crate::kind::Kind;

    #[test]
    fn test_first_seen_order() {
        let mut b = FrameBuilder::new("response");
        b.push_row(Row::named([("b", 1), ("a", 2)])).unwrap();
        b.push_row(Row::named([("c", 3), ("a", 4)])).unwrap();
        let names: Vec<_> = b.column_names().map(str::to_string).collect();
        assert_eq!(names, ["b", "a", "c"]);
    }

    #[test]
    fn test_missing_and_late_columns_are_padded() {
        let mut b = FrameBuilder::new("response");
        b.push_row(Row::named([("x", 1)])).unwrap();
        b.push_row(Row::named([("y", "late")])).unwrap();
        b.push_row(Row::named([("x", 3)])).unwrap();
        let frame = b.finish();

        assert_eq!(frame.row_count(), 3);
        let x = frame.column("x").unwrap();
        assert_eq!(x.values, ColumnValues::Int32(vec![1, 0, 3]));
        assert!(x.is_null(1));
        let y = frame.column("y").unwrap();
        assert_eq!(
            y.values,
            ColumnValues::String(vec![String::new(), "late".into(), String::new()])
        );
    }

    #[test]
    fn test_manifest_fixes_order_and_keeps_empty_columns() {
        let frame = FrameBuilder::with_manifest("response", ["id", "email"]).finish();
        assert_eq!(frame.row_count(), 0);
        assert_eq!(frame.columns.len(), 2);
        assert_eq!(frame.columns[0].name, "id");
        assert_eq!(frame.columns[1].name, "email");
        assert!(frame.columns.iter().all(Column::is_empty));
    }

    #[test]
    fn test_positional_rows_follow_manifest() {
        let mut b = FrameBuilder::with_manifest("response", ["id", "email"]);
        b.push_row(Row::positional([Value::Int64(1), Value::from("a@x")])).unwrap();
        b.push_row(Row::positional([Value::Int64(2)])).unwrap();
        b.push_row(Row::positional([Value::Int64(3), Value::Null, Value::Bool(true)]))
            .unwrap();
        let frame = b.finish();

        assert_eq!(frame.columns.len(), 3);
        assert_eq!(frame.columns[0].values, ColumnValues::Int64(vec![1, 2, 3]));
        assert_eq!(frame.columns[1].kind(), Kind::String);
        assert_eq!(frame.columns[2].name, "col2");
        assert_eq!(frame.columns[2].values, ColumnValues::Bool(vec![false, false, true]));
    }

    #[test]
    fn test_named_rows_outside_manifest_are_appended() {
        let mut b = FrameBuilder::with_manifest("response", ["id"]);
        b.push_row(Row::named([("extra", 1.5), ("id", 2.0)])).unwrap();
        let frame = b.finish();
        let names: Vec<_> = frame.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["id", "extra"]);
    }

    #[test]
    fn test_duplicate_column_in_row_keeps_first() {
        let mut b = FrameBuilder::new("response");
        b.push_row(Row::named([("a", 1), ("a", 2)])).unwrap();
        let frame = b.finish();
        assert_eq!(frame.columns[0].values, ColumnValues::Int32(vec![1]));
    }
}
