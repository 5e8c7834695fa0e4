use serde::Deserialize;

use super::error::PluginError;
use super::sql;
use super::wire::{CollectionRef, Direction, FieldReference, Filter, Literal, Operator, Order, StructuredQuery};

// ═══════════════════════════════════════════════════════════════
//  Query model: sent from the Grafana query editor
// ═══════════════════════════════════════════════════════════════

/// One panel query. `query` selects SQL-subset mode; otherwise the
/// structured fields describe the Firestore query directly.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirestoreQuery {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub collection_path: String,
    #[serde(default)]
    pub select: Vec<String>,
    #[serde(default, rename = "where")]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub order_by: Vec<OrderClause>,
    #[serde(default)]
    pub limit: Option<Limit>,
    #[serde(default)]
    pub is_count: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub path: String,
    pub operator: String,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub value_type: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderClause {
    pub path: String,
    #[serde(default)]
    pub direction: DirectionRepr,
}

/// Accepts `"asc"`/`"desc"` spellings and the numeric `1`/`2` encoding.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DirectionRepr {
    Code(i64),
    Name(String),
}

impl Default for DirectionRepr {
    fn default() -> Self {
        DirectionRepr::Code(1)
    }
}

impl DirectionRepr {
    fn resolve(&self) -> Result<Direction, PluginError> {
        match self {
            DirectionRepr::Code(1) => Ok(Direction::Ascending),
            DirectionRepr::Code(2) => Ok(Direction::Descending),
            DirectionRepr::Name(name) => match name.trim().to_ascii_lowercase().as_str() {
                "" | "asc" | "ascending" => Ok(Direction::Ascending),
                "desc" | "descending" => Ok(Direction::Descending),
                other => Err(PluginError::validation(format!("unsupported order direction '{other}'"))),
            },
            DirectionRepr::Code(other) => Err(PluginError::validation(format!(
                "unsupported order direction {other}",
            ))),
        }
    }
}

/// Row limit as a number or a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Limit {
    Number(serde_json::Number),
    Text(String),
}

impl Limit {
    /// `None` when unbounded; zero and negative values mean no limit.
    fn resolve(&self) -> Result<Option<i32>, PluginError> {
        let parsed = match self {
            Limit::Number(n) => n.as_i64(),
            Limit::Text(t) if t.trim().is_empty() => Some(0),
            Limit::Text(t) => t.trim().parse::<i64>().ok(),
        };
        let limit = parsed.ok_or_else(|| PluginError::validation(format!("limit: invalid number {}", self.text())))?;
        if limit <= 0 {
            return Ok(None);
        }
        i32::try_from(limit)
            .map(Some)
            .map_err(|_| PluginError::validation(format!("limit: {limit} is too large")))
    }

    fn text(&self) -> String {
        match self {
            Limit::Number(n) => n.to_string(),
            Limit::Text(t) => format!("'{t}'"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Plan: what the row source executes
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Plan {
    pub target: CollectionRef,
    pub query: StructuredQuery,
    pub output: Output,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Output {
    /// One row per document. `None` emits all fields in first-seen order;
    /// `Some` declares the column manifest.
    Documents(Option<Vec<ProjectedColumn>>),
    /// A single row holding the matching-document count, in a column of
    /// the given name.
    Count(String),
}

/// Column name of a count row unless the query aliases it.
pub(crate) const COUNT_COLUMN: &str = "count";

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ProjectedColumn {
    pub name: String,
    pub field: FieldRef,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FieldRef {
    DocumentId,
    Path(Vec<String>),
}

pub(crate) const DOCUMENT_ID: &str = "__name__";

impl FieldRef {
    pub fn parse(path: &str) -> Self {
        if path == DOCUMENT_ID {
            FieldRef::DocumentId
        } else {
            FieldRef::Path(path.split('.').map(str::to_string).collect())
        }
    }
}

impl FirestoreQuery {
    /// Resolve the payload into a plan. `None` when the editor has not
    /// named a collection or query yet.
    pub(crate) fn plan(&self) -> Result<Option<Plan>, PluginError> {
        if !self.query.trim().is_empty() {
            return sql::translate(&self.query).map(Some);
        }
        if self.collection_path.trim().is_empty() {
            return Ok(None);
        }

        let target = CollectionRef::parse(&self.collection_path)?;
        let mut query = StructuredQuery::over(&target);

        query.select(self.select.iter().map(|s| s.trim()).filter(|s| !s.is_empty()));

        let filters = self
            .conditions
            .iter()
            .map(|c| {
                let op = Operator::parse(&c.operator)?;
                let value = Literal::from_hint(&c.value, &c.value_type, op.takes_list())?;
                Filter::compare(c.path.trim(), op, value)
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.with_context("where"))?;
        query.filter_all(filters);

        for clause in &self.order_by {
            query.order_by.push(Order {
                field: FieldReference::new(clause.path.trim()),
                direction: clause.direction.resolve()?,
            });
        }

        query.limit = match &self.limit {
            Some(limit) => limit.resolve()?,
            None => None,
        };

        let output = if self.is_count { Output::Count(COUNT_COLUMN.to_string()) } else { Output::Documents(None) };
        Ok(Some(Plan { target, query, output }))
    }
}
