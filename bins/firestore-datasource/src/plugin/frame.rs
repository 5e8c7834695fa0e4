use grafana_plugin_sdk::data;
use grafana_plugin_sdk::prelude::*;
use tokio_util::sync::CancellationToken;

use frame_engine::{ColumnValues, Frame, FrameBuilder};

use super::error::PluginError;
use super::source::RowSource;

pub(crate) const FRAME_NAME: &str = "response";

// ═══════════════════════════════════════════════════════════════
//  Driver: pull rows until the source is exhausted
// ═══════════════════════════════════════════════════════════════

/// Drain `source` into a frame. Cancellation drops everything gathered so
/// far; no partial frame is ever returned.
pub(crate) async fn collect_frame(
    source: &mut dyn RowSource,
    cancel: &CancellationToken,
) -> Result<Frame, PluginError> {
    let mut builder = match source.columns() {
        Some(columns) => FrameBuilder::with_manifest(FRAME_NAME, columns),
        None => FrameBuilder::new(FRAME_NAME),
    };

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(PluginError::cancelled(format!(
                    "query cancelled after {} rows",
                    builder.rows(),
                )));
            }
            next = source.next_row() => next?,
        };
        let Some(row) = next else { break };
        builder.push_row(row)?;
    }

    Ok(builder.finish())
}

// ═══════════════════════════════════════════════════════════════
//  SDK conversion
// ═══════════════════════════════════════════════════════════════

/// Hand a finished frame to the SDK, one field per column in order.
pub(crate) fn to_grafana_frame(frame: Frame) -> data::Frame {
    frame
        .columns
        .into_iter()
        .fold(data::Frame::new(frame.name), |out, column| {
            let name = column.name;
            let field = match column.values {
                ColumnValues::Bool(v) => v.into_field(name),
                ColumnValues::Int32(v) => v.into_field(name),
                ColumnValues::Int64(v) => v.into_field(name),
                ColumnValues::Float64(v) => v.into_field(name),
                ColumnValues::Timestamp(v) => v.into_field(name),
                ColumnValues::String(v) | ColumnValues::Structured(v) => v.into_field(name),
            };
            out.with_field(field)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame_engine::{Row, Value};
    use grafana_plugin_sdk::backend::async_trait;

    struct Rows(Vec<Row>);

    #[async_trait]
    impl RowSource for Rows {
        fn columns(&self) -> Option<Vec<String>> {
            None
        }

        async fn next_row(&mut self) -> Result<Option<Row>, PluginError> {
            Ok((!self.0.is_empty()).then(|| self.0.remove(0)))
        }
    }

    struct Stalled;

    #[async_trait]
    impl RowSource for Stalled {
        fn columns(&self) -> Option<Vec<String>> {
            Some(vec!["id".into()])
        }

        async fn next_row(&mut self) -> Result<Option<Row>, PluginError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_collect_frame_drains_source() {
        let mut source = Rows(vec![
            Row::named([("id", Value::Int32(1))]),
            Row::named([("id", Value::Int32(2)), ("name", Value::from("b"))]),
        ]);
        let frame = collect_frame(&mut source, &CancellationToken::new()).await.unwrap();
        assert_eq!(frame.name, FRAME_NAME);
        assert_eq!(frame.row_count(), 2);
        assert_eq!(frame.column("name").unwrap().values, ColumnValues::String(vec![String::new(), "b".into()]));
    }

    #[tokio::test]
    async fn test_cancelled_source_yields_no_frame() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = collect_frame(&mut Stalled, &cancel).await.unwrap_err();
        assert_eq!(err.kind(), crate::plugin::error::ErrorKind::Cancelled);
    }

    #[test]
    fn test_grafana_frame_keeps_column_order() {
        let mut builder = FrameBuilder::new(FRAME_NAME);
        builder
            .push_row(Row::named([
                ("id", Value::Int64(1)),
                ("active", Value::Bool(true)),
                ("tags", Value::Structured(serde_json::json!(["a"]))),
                ("seen", Value::Timestamp(chrono::DateTime::default())),
            ]))
            .unwrap();
        let frame = to_grafana_frame(builder.finish());
        let names: Vec<_> = frame.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["id", "active", "tags", "seen"]);
        assert!(frame.check().is_ok());
    }
}
