use grafana_plugin_sdk::backend::async_trait;

use frame_engine::{Row, Value};

use super::decode::{Document, decode_value};
use super::error::PluginError;
use super::firestore::{DocumentStream, FirestoreClient};
use super::query::{FieldRef, Output, Plan, ProjectedColumn};

// ═══════════════════════════════════════════════════════════════
//  RowSource: what the frame driver pulls from
// ═══════════════════════════════════════════════════════════════

/// A finite, ordered sequence of result rows.
#[async_trait]
pub(crate) trait RowSource: Send {
    /// Declared column manifest, if the query names its columns up front.
    fn columns(&self) -> Option<Vec<String>>;

    /// Next row, or `None` once the source is exhausted.
    async fn next_row(&mut self) -> Result<Option<Row>, PluginError>;
}

// ═══════════════════════════════════════════════════════════════
//  FirestoreSource
// ═══════════════════════════════════════════════════════════════

/// Executes a [`Plan`] on first pull and yields one row per document as the
/// response arrives, or a single count row for aggregation plans.
pub(crate) struct FirestoreSource {
    client: FirestoreClient,
    plan: Plan,
    /// `None` until the query has run.
    documents: Option<DocumentStream>,
    done: bool,
}

impl FirestoreSource {
    pub fn new(client: FirestoreClient, plan: Plan) -> Self {
        // A zero limit matches nothing; no request is made.
        let done = plan.query.limit == Some(0);
        Self { client, plan, documents: None, done }
    }
}

#[async_trait]
impl RowSource for FirestoreSource {
    fn columns(&self) -> Option<Vec<String>> {
        match &self.plan.output {
            Output::Documents(Some(columns)) => Some(columns.iter().map(|c| c.name.clone()).collect()),
            Output::Documents(None) => None,
            Output::Count(name) => Some(vec![name.clone()]),
        }
    }

    async fn next_row(&mut self) -> Result<Option<Row>, PluginError> {
        if self.done {
            return Ok(None);
        }
        if let Output::Count(_) = self.plan.output {
            let count = self.client.run_count(&self.plan.target, &self.plan.query).await?;
            self.done = true;
            return Ok(Some(Row::positional([count])));
        }

        if self.documents.is_none() {
            self.documents = Some(self.client.run_query(&self.plan.target, &self.plan.query).await?);
        }
        let Some(documents) = self.documents.as_mut() else {
            return Ok(None);
        };
        let Some(document) = documents.next_document().await? else {
            self.done = true;
            return Ok(None);
        };

        let row = match &self.plan.output {
            Output::Documents(Some(columns)) => project(&document, columns),
            _ => document_row(&document),
        };
        Ok(Some(row))
    }
}

/// All fields of a document, in the order the server returned them.
pub(crate) fn document_row(document: &Document) -> Row {
    Row::Named(
        document
            .fields
            .iter()
            .map(|(name, typed)| (name.clone(), decode_value(typed)))
            .collect(),
    )
}

/// Declared columns of a document; fields it lacks come out as nulls.
pub(crate) fn project(document: &Document, columns: &[ProjectedColumn]) -> Row {
    Row::Positional(
        columns
            .iter()
            .map(|column| match &column.field {
                FieldRef::DocumentId => Value::String(document.id().to_string()),
                FieldRef::Path(path) => document.lookup(path).map(decode_value).unwrap_or(Value::Null),
            })
            .collect(),
    )
}
