use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use futures::stream::FuturesOrdered;
use grafana_plugin_sdk::backend::{self, BoxDataResponseStream, DataResponse, async_trait};
use grafana_plugin_sdk::data;
use tokio_util::sync::CancellationToken;

use super::error::{ErrorKind, PluginError, QueryError};
use super::frame::{collect_frame, to_grafana_frame};
use super::query::FirestoreQuery;
use super::source::{FirestoreSource, RowSource};
use super::{Connection, FirestorePlugin};

// ═══════════════════════════════════════════════════════════════
//  DataService
// ═══════════════════════════════════════════════════════════════

#[async_trait]
impl backend::DataService for FirestorePlugin {
    // Parsed per query so a malformed payload fails only its own ref id.
    type Query = serde_json::Value;
    type QueryError = QueryError;
    type Stream = BoxDataResponseStream<Self::QueryError>;

    async fn query_data(&self, request: backend::QueryDataRequest<Self::Query, Self>) -> Self::Stream {
        let connection = self.connect(request.plugin_context.instance_settings.as_ref());
        tracing::debug!(queries = request.queries.len(), "query_data");

        dispatch(
            request.queries.into_iter().map(|q| (q.ref_id, q.query)),
            move |payload| handle_query(connection.clone(), payload),
        )
    }
}

// ═══════════════════════════════════════════════════════════════
//  Batch dispatch: one guarded future per query, answers in order
// ═══════════════════════════════════════════════════════════════

pub(crate) fn dispatch<F, Fut>(
    queries: impl IntoIterator<Item = (String, serde_json::Value)>,
    handle: F,
) -> BoxDataResponseStream<QueryError>
where
    F: Fn(serde_json::Value) -> Fut,
    Fut: Future<Output = Result<Option<data::Frame>, PluginError>> + Send + 'static,
{
    Box::pin(
        queries
            .into_iter()
            .map(|(ref_id, payload)| guarded(ref_id, handle(payload)))
            .collect::<FuturesOrdered<_>>(),
    )
}

/// Run one query, turning a panic into an internal error for its ref id.
async fn guarded<Fut>(ref_id: String, query: Fut) -> Result<DataResponse, QueryError>
where
    Fut: Future<Output = Result<Option<data::Frame>, PluginError>>,
{
    let outcome = AssertUnwindSafe(query)
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(PluginError::internal(panic_message(&*panic))));

    let frame;
    let frames = match outcome {
        Ok(Some(owned)) => {
            frame = owned;
            frame
                .check()
                .map(|checked| vec![checked])
                .map_err(|e| PluginError::internal(format!("frame error: {e}")))
        }
        Ok(None) => Ok(Vec::new()),
        Err(error) => Err(error),
    };

    match frames {
        Ok(frames) => {
            tracing::debug!(ref_id = %ref_id, frames = frames.len(), "query finished");
            Ok(DataResponse::new(ref_id, frames))
        }
        Err(error) => {
            match error.kind() {
                ErrorKind::Internal => tracing::error!(ref_id = %ref_id, %error, "query failed"),
                _ => tracing::warn!(ref_id = %ref_id, %error, "query failed"),
            }
            Err(QueryError::new(ref_id, error))
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("query panicked: {detail}")
}

// ═══════════════════════════════════════════════════════════════
//  Single query
// ═══════════════════════════════════════════════════════════════

async fn handle_query(
    connection: Result<Connection, PluginError>,
    payload: serde_json::Value,
) -> Result<Option<data::Frame>, PluginError> {
    let query: FirestoreQuery =
        serde_json::from_value(payload).map_err(|e| PluginError::validation(format!("parse query: {e}")))?;
    let Some(plan) = query.plan()? else {
        return Ok(None);
    };
    let connection = connection?;

    let mut source = FirestoreSource::new(connection.client, plan);
    let frame = execute(&mut source, connection.query_timeout).await?;
    Ok(Some(to_grafana_frame(frame)))
}

/// Drain `source` under a deadline; expiry cancels the collection.
pub(crate) async fn execute(
    source: &mut dyn RowSource,
    timeout: Duration,
) -> Result<frame_engine::Frame, PluginError> {
    let cancel = CancellationToken::new();
    let timer = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(timeout).await;
            cancel.cancel();
        }
    });

    let result = collect_frame(source, &cancel).await;
    timer.abort();
    result.map_err(|e| match e.kind() {
        ErrorKind::Cancelled => e.with_context(format!("timed out after {}s", timeout.as_secs())),
        _ => e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame_engine::{Row, Value};
    use futures::StreamExt;
    use serde_json::json;

    struct Stalled;

    #[async_trait]
    impl RowSource for Stalled {
        fn columns(&self) -> Option<Vec<String>> {
            None
        }

        async fn next_row(&mut self) -> Result<Option<Row>, PluginError> {
            std::future::pending().await
        }
    }

    struct Counter(i64);

    #[async_trait]
    impl RowSource for Counter {
        fn columns(&self) -> Option<Vec<String>> {
            Some(vec!["n".into()])
        }

        async fn next_row(&mut self) -> Result<Option<Row>, PluginError> {
            if self.0 == 0 {
                return Ok(None);
            }
            self.0 -= 1;
            Ok(Some(Row::positional([Value::Int64(self.0)])))
        }
    }

    fn no_connection() -> Result<Connection, PluginError> {
        Err(PluginError::validation("project Id is required"))
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let queries = vec![
            ("A".to_string(), json!({"n": 2})),
            ("B".to_string(), json!({"panic": true})),
            ("C".to_string(), json!({"fail": true})),
            ("D".to_string(), json!({"n": 0})),
        ];
        let responses: Vec<_> = dispatch(queries, |payload| async move {
            if payload.get("panic").is_some() {
                panic!("bad row");
            }
            if payload.get("fail").is_some() {
                return Err(PluginError::execution("no matching index"));
            }
            let mut source = Counter(payload["n"].as_i64().unwrap_or(0));
            execute(&mut source, Duration::from_secs(5)).await.map(|frame| Some(to_grafana_frame(frame)))
        })
        .collect()
        .await;

        assert_eq!(responses.len(), 4);
        assert!(responses[0].is_ok());
        assert!(responses[3].is_ok());

        let Err(panicked) = &responses[1] else { panic!("expected failure for B") };
        assert_eq!(panicked.ref_id, "B");
        assert_eq!(panicked.error.kind(), ErrorKind::Internal);
        assert!(panicked.error.message().contains("bad row"));

        let Err(failed) = &responses[2] else { panic!("expected failure for C") };
        assert_eq!(failed.ref_id, "C");
        assert_eq!(failed.error.kind(), ErrorKind::Execution);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_cancellation() {
        let err = execute(&mut Stalled, Duration::from_secs(30)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(err.message().starts_with("timed out after 30s"));
    }

    #[tokio::test]
    async fn test_manifest_source_with_no_rows() {
        let frame = execute(&mut Counter(0), Duration::from_secs(5)).await.unwrap();
        assert_eq!(frame.row_count(), 0);
        assert_eq!(frame.columns.len(), 1);
        assert!(frame.columns[0].is_empty());
    }

    #[tokio::test]
    async fn test_empty_payload_yields_no_frame() {
        let out = handle_query(no_connection(), json!({"refId": "A"})).await.unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn test_settings_error_surfaces_per_query() {
        let err = handle_query(no_connection(), json!({"collectionPath": "users"})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.message(), "project Id is required");
    }

    #[tokio::test]
    async fn test_malformed_payload_is_validation_error() {
        let err = handle_query(no_connection(), json!({"collectionPath": 5})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.message().starts_with("parse query: "));
    }
}
