use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use serde::Deserialize;
use serde_json::json;

use super::decode::{Document, RunQueryItem, decode_value};
use super::error::PluginError;
use super::settings::FirestoreSettings;
use super::wire::{CollectionRef, StructuredQuery};

const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

// ═══════════════════════════════════════════════════════════════
//  Client
// ═══════════════════════════════════════════════════════════════

/// Firestore REST v1 client bound to one database.
#[derive(Clone)]
pub(crate) struct FirestoreClient {
    http: reqwest::Client,
    /// `{endpoint}/v1`
    base_url: String,
    /// `projects/{p}/databases/{d}`
    database: String,
    auth: Option<Arc<CustomServiceAccount>>,
}

impl std::fmt::Debug for FirestoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirestoreClient")
            .field("base_url", &self.base_url)
            .field("database", &self.database)
            .field("authenticated", &self.auth.is_some())
            .finish()
    }
}

impl FirestoreClient {
    pub fn connect(http: reqwest::Client, settings: &FirestoreSettings) -> Result<Self, PluginError> {
        let auth = match &settings.service_account {
            Some(key) => Some(Arc::new(
                CustomServiceAccount::from_json(key)
                    .map_err(|e| PluginError::validation(format!("invalid service account: {e}")))?,
            )),
            None => None,
        };
        Ok(Self {
            http,
            base_url: format!("{}/v1", settings.endpoint.trim_end_matches('/')),
            database: settings.database_path(),
            auth,
        })
    }

    /// Documents matching `query` under `target`, in server order, decoded
    /// as the response body arrives.
    pub async fn run_query(
        &self,
        target: &CollectionRef,
        query: &StructuredQuery,
    ) -> Result<DocumentStream, PluginError> {
        let url = format!("{}:runQuery", self.parent_url(target));
        let body = json!({ "structuredQuery": query });
        let response = self.send(&url, &body).await.map_err(|e| e.with_context("runQuery"))?;
        Ok(DocumentStream::new(target.to_string(), response.bytes_stream().boxed()))
    }

    /// Server-side `COUNT(*)` over `query`.
    pub async fn run_count(&self, target: &CollectionRef, query: &StructuredQuery) -> Result<i64, PluginError> {
        let url = format!("{}:runAggregationQuery", self.parent_url(target));
        let body = json!({
            "structuredAggregationQuery": {
                "structuredQuery": query,
                "aggregations": [{ "alias": "count", "count": {} }],
            }
        });
        let items: Vec<AggregationItem> =
            self.post(&url, &body).await.map_err(|e| e.with_context("runAggregationQuery"))?;

        let count = items
            .iter()
            .filter_map(|item| item.result.as_ref())
            .find_map(|result| result.aggregate_fields.get("count"))
            .map(decode_value);
        match count {
            Some(frame_engine::Value::Int64(n)) => Ok(n),
            Some(other) => Err(PluginError::internal(format!("unexpected count value {other:?}"))),
            // An aggregation over nothing can come back without a result.
            None => Ok(0),
        }
    }

    /// Root collection ids; the health check lists one to reach the database.
    pub async fn list_collection_ids(&self, page_size: i32) -> Result<Vec<String>, PluginError> {
        let url = format!("{}/{}/documents:listCollectionIds", self.base_url, self.database);
        let body = json!({ "pageSize": page_size });
        let page: CollectionIdsPage = self.post(&url, &body).await.map_err(|e| e.with_context("listCollectionIds"))?;
        Ok(page.collection_ids)
    }

    fn parent_url(&self, target: &CollectionRef) -> String {
        if target.parent.is_empty() {
            format!("{}/{}/documents", self.base_url, self.database)
        } else {
            format!("{}/{}/documents/{}", self.base_url, self.database, target.parent)
        }
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T, PluginError> {
        let text = self
            .send(url, body)
            .await?
            .text()
            .await
            .map_err(|e| PluginError::connection(format!("read response: {e}")))?;
        serde_json::from_str(&text).map_err(|e| PluginError::internal(format!("decode response: {e}")))
    }

    /// POST with auth; non-2xx statuses become errors.
    async fn send(&self, url: &str, body: &serde_json::Value) -> Result<reqwest::Response, PluginError> {
        let mut request = self.http.post(url).json(body);
        if let Some(auth) = &self.auth {
            let token = auth
                .token(&[DATASTORE_SCOPE])
                .await
                .map_err(|e| PluginError::connection(format!("obtain access token: {e}")))?;
            request = request.bearer_auth(token.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| PluginError::connection(format!("request failed: {e}")))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response
            .text()
            .await
            .map_err(|e| PluginError::connection(format!("read response: {e}")))?;
        tracing::warn!(%status, url, "Firestore rejected request");
        Err(rejection(status, &text))
    }
}

// ═══════════════════════════════════════════════════════════════
//  Streaming runQuery results
// ═══════════════════════════════════════════════════════════════

/// Documents of one `runQuery` response, decoded item by item from the
/// body's JSON array.
pub(crate) struct DocumentStream {
    collection: String,
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    items: ArrayItems,
    received: usize,
    finished: bool,
}

impl DocumentStream {
    pub fn new(collection: String, body: BoxStream<'static, reqwest::Result<Bytes>>) -> Self {
        Self { collection, body, items: ArrayItems::default(), received: 0, finished: false }
    }

    /// Next document, or `None` once the array is closed.
    pub async fn next_document(&mut self) -> Result<Option<Document>, PluginError> {
        while !self.finished {
            while let Some(raw) = self.items.next_item()? {
                let item: RunQueryItem = serde_json::from_slice(&raw)
                    .map_err(|e| PluginError::internal(format!("runQuery: decode response: {e}")))?;
                // Items without a document only carry progress (`readTime`, `skippedResults`).
                if let Some(document) = item.document {
                    self.received += 1;
                    return Ok(Some(document));
                }
            }

            match self.body.next().await {
                Some(Ok(chunk)) => self.items.feed(&chunk),
                Some(Err(e)) => {
                    return Err(PluginError::connection(format!("runQuery: read response: {e}")));
                }
                None => {
                    self.items.finish().map_err(|e| e.with_context("runQuery"))?;
                    self.finished = true;
                    tracing::debug!(collection = %self.collection, documents = self.received, "runQuery finished");
                }
            }
        }
        Ok(None)
    }
}

/// Splits a top-level JSON array of objects into its elements while the
/// bytes are still arriving. Tracks nesting and string state only; each
/// element is validated when it is deserialized.
#[derive(Debug, Default)]
struct ArrayItems {
    buf: Vec<u8>,
    /// Bytes of `buf` already scanned.
    scanned: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
    opened: bool,
    closed: bool,
}

impl ArrayItems {
    fn feed(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// The next complete element, or `None` if more input is needed.
    fn next_item(&mut self) -> Result<Option<Vec<u8>>, PluginError> {
        while self.scanned < self.buf.len() {
            let at = self.scanned;
            let byte = self.buf[at];
            self.scanned += 1;

            if self.in_string {
                match byte {
                    _ if self.escaped => self.escaped = false,
                    b'\\' => self.escaped = true,
                    b'"' => self.in_string = false,
                    _ => {}
                }
                continue;
            }

            match (self.depth, byte) {
                (_, b' ' | b'\n' | b'\r' | b'\t') => {}
                (0, b'[') if !self.opened => self.opened = true,
                (0, b',') if self.opened && !self.closed => {}
                (0, b']') if self.opened && !self.closed => self.closed = true,
                (0, b'{') if self.opened && !self.closed => {
                    // Drop separators so the element starts the buffer.
                    self.buf.drain(..at);
                    self.scanned = 1;
                    self.depth = 1;
                }
                (0, other) => {
                    return Err(PluginError::internal(format!(
                        "decode response: unexpected '{}' outside an array element",
                        other as char,
                    )));
                }
                (_, b'"') => self.in_string = true,
                (_, b'{' | b'[') => self.depth += 1,
                (_, b'}' | b']') => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        let item: Vec<u8> = self.buf.drain(..self.scanned).collect();
                        self.scanned = 0;
                        return Ok(Some(item));
                    }
                }
                _ => {}
            }
        }

        if self.depth == 0 {
            self.buf.clear();
            self.scanned = 0;
        }
        Ok(None)
    }

    /// Fails unless the whole array has been seen.
    fn finish(&self) -> Result<(), PluginError> {
        if self.closed && self.depth == 0 {
            Ok(())
        } else {
            Err(PluginError::internal("decode response: truncated result array"))
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Responses
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct AggregationItem {
    #[serde(default)]
    result: Option<AggregationResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AggregationResult {
    #[serde(default)]
    aggregate_fields: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CollectionIdsPage {
    #[serde(default)]
    collection_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Map a non-2xx response to an error kind. Streaming endpoints wrap the
/// error object in an array.
fn rejection(status: reqwest::StatusCode, text: &str) -> PluginError {
    let body = serde_json::from_str::<ErrorEnvelope>(text)
        .or_else(|_| {
            serde_json::from_str::<Vec<ErrorEnvelope>>(text)
                .map_err(|_| ())
                .and_then(|mut v| if v.is_empty() { Err(()) } else { Ok(v.remove(0)) })
        })
        .ok()
        .map(|e| e.error);

    let message = match body {
        Some(ErrorBody { message, status: code }) if !code.is_empty() => format!("{code}: {message}"),
        Some(ErrorBody { message, .. }) if !message.is_empty() => message,
        _ => format!("HTTP {status}: {}", text.trim()),
    };

    match status.as_u16() {
        401 | 403 => PluginError::connection(message),
        _ => PluginError::execution(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::error::ErrorKind;
    use reqwest::StatusCode;

    fn client(endpoint: &str) -> FirestoreClient {
        let settings = FirestoreSettings::resolve(
            &json!({"projectId": "p"}),
            &json!({}),
            Some(endpoint),
        )
        .unwrap();
        FirestoreClient::connect(reqwest::Client::new(), &settings).unwrap()
    }

    #[test]
    fn test_urls() {
        let c = client("localhost:8080");
        let root = CollectionRef::parse("users").unwrap();
        let nested = CollectionRef::parse("users/abc/orders").unwrap();
        assert_eq!(
            c.parent_url(&root),
            "http://localhost:8080/v1/projects/p/databases/(default)/documents"
        );
        assert_eq!(
            c.parent_url(&nested),
            "http://localhost:8080/v1/projects/p/databases/(default)/documents/users/abc"
        );
    }

    #[test]
    fn test_invalid_credentials_are_rejected() {
        let settings = FirestoreSettings::resolve(
            &json!({"projectId": "p"}),
            &json!({"serviceAccount": "{\"type\": \"service_account\"}"}),
            None,
        )
        .unwrap();
        let err = FirestoreClient::connect(reqwest::Client::new(), &settings).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_rejection_mapping() {
        let body = r#"{"error": {"code": 400, "message": "no matching index", "status": "FAILED_PRECONDITION"}}"#;
        let err = rejection(StatusCode::BAD_REQUEST, body);
        assert_eq!(err.kind(), ErrorKind::Execution);
        assert_eq!(err.message(), "FAILED_PRECONDITION: no matching index");

        let wrapped = format!("[{body}]");
        assert_eq!(rejection(StatusCode::BAD_REQUEST, &wrapped).message(), err.message());

        let err = rejection(StatusCode::FORBIDDEN, r#"{"error": {"message": "denied"}}"#);
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(err.message(), "denied");

        let err = rejection(StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(err.kind(), ErrorKind::Execution);
        assert_eq!(err.message(), "HTTP 502 Bad Gateway: upstream down");
    }

    #[test]
    fn test_aggregation_response() {
        let items: Vec<AggregationItem> = serde_json::from_str(
            r#"[{"result": {"aggregateFields": {"count": {"integerValue": "5"}}}, "readTime": "2024-01-01T00:00:00Z"}]"#,
        )
        .unwrap();
        let fields = &items[0].result.as_ref().unwrap().aggregate_fields;
        assert_eq!(decode_value(&fields["count"]), frame_engine::Value::Int64(5));
    }

    fn chunked(body: &str, size: usize) -> DocumentStream {
        let chunks: Vec<reqwest::Result<Bytes>> =
            body.as_bytes().chunks(size).map(|c| Ok(Bytes::copy_from_slice(c))).collect();
        DocumentStream::new("users".into(), futures::stream::iter(chunks).boxed())
    }

    #[tokio::test]
    async fn test_documents_decode_across_chunk_boundaries() {
        let body = r#"[{"readTime": "2024-01-01T00:00:00Z"},
            {"document": {"name": "projects/p/databases/(default)/documents/users/a",
                          "fields": {"note": {"stringValue": "}], \"quoted\" \\ {["}}}},
            {"document": {"name": "projects/p/databases/(default)/documents/users/b"}}
        ]"#;
        for size in [1, 2, 5, 16, body.len()] {
            let mut stream = chunked(body, size);
            let mut documents = Vec::new();
            while let Some(document) = stream.next_document().await.unwrap() {
                documents.push(document);
            }
            let ids: Vec<_> = documents.iter().map(Document::id).collect();
            assert_eq!(ids, ["a", "b"], "chunk size {size}");
            assert_eq!(
                decode_value(&documents[0].fields["note"]),
                frame_engine::Value::String(r#"}], "quoted" \ {["#.into())
            );
            assert!(stream.next_document().await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_documents_arrive_before_body_ends() {
        let (tx, rx) = futures::channel::mpsc::unbounded::<reqwest::Result<Bytes>>();
        let mut stream = DocumentStream::new("users".into(), rx.boxed());
        tx.unbounded_send(Ok(Bytes::from_static(br#"[{"document": {"name": "x/users/a"}}, {"docu"#)))
            .unwrap();

        let first = stream.next_document().await.unwrap().unwrap();
        assert_eq!(first.id(), "a");

        tx.unbounded_send(Ok(Bytes::from_static(br#"ment": {"name": "x/users/b"}}]"#))).unwrap();
        drop(tx);
        assert_eq!(stream.next_document().await.unwrap().unwrap().id(), "b");
        assert!(stream.next_document().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_result_array() {
        let mut stream = chunked(r#"[{"document": {"name": "x/users/a"}}, {"docu"#, 4);
        assert_eq!(stream.next_document().await.unwrap().unwrap().id(), "a");
        let err = stream.next_document().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.message().contains("truncated"), "{err}");

        let err = chunked(r#"{"error": {}}"#, 64).next_document().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
