mod data_service;
mod decode;
mod error;
mod firestore;
mod frame;
mod query;
mod settings;
mod source;
mod sql;
mod wire;

use std::time::Duration;

use grafana_plugin_sdk::backend::{self, async_trait};
use grafana_plugin_sdk::prelude::*;

use error::PluginError;
use firestore::FirestoreClient;
use settings::FirestoreSettings;

// ═══════════════════════════════════════════════════════════════
//  Plugin struct
// ═══════════════════════════════════════════════════════════════

#[derive(Clone, Debug, GrafanaPlugin)]
#[grafana_plugin(plugin_type = "datasource")]
pub struct FirestorePlugin {
    http: reqwest::Client,
}

impl FirestorePlugin {
    pub fn new() -> Self {
        Self { http: reqwest::Client::new() }
    }

    /// Resolve instance settings into a ready client. Done once per request
    /// and handed to every query in it.
    fn connect(
        &self,
        instance: Option<&backend::DataSourceInstanceSettings<serde_json::Value, serde_json::Value>>,
    ) -> Result<Connection, PluginError> {
        let instance = instance.ok_or_else(|| PluginError::validation("missing data source settings"))?;
        self.connect_with(&instance.json_data, &instance.decrypted_secure_json_data)
    }

    fn connect_with(
        &self,
        json_data: &serde_json::Value,
        secure_json_data: &serde_json::Value,
    ) -> Result<Connection, PluginError> {
        let settings = FirestoreSettings::from_instance(json_data, secure_json_data)?;
        tracing::debug!(?settings, "resolved data source settings");
        Ok(Connection {
            client: FirestoreClient::connect(self.http.clone(), &settings)?,
            query_timeout: settings.query_timeout,
        })
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Connection {
    client: FirestoreClient,
    query_timeout: Duration,
}

// ═══════════════════════════════════════════════════════════════
//  DiagnosticsService
// ═══════════════════════════════════════════════════════════════

#[async_trait]
impl backend::DiagnosticsService for FirestorePlugin {
    type CheckHealthError = std::convert::Infallible;
    type CollectMetricsError = std::convert::Infallible;

    async fn check_health(
        &self,
        request: backend::CheckHealthRequest<Self>,
    ) -> Result<backend::CheckHealthResponse, Self::CheckHealthError> {
        let outcome = health(self.connect(request.plugin_context.instance_settings.as_ref())).await;
        Ok(match outcome {
            Ok(message) => backend::CheckHealthResponse::ok(message),
            Err(e) => backend::CheckHealthResponse::error(e.to_string()),
        })
    }

    async fn collect_metrics(
        &self,
        _request: backend::CollectMetricsRequest<Self>,
    ) -> Result<backend::CollectMetricsResponse, Self::CollectMetricsError> {
        Ok(backend::CollectMetricsResponse::new(None))
    }
}

/// Settings must resolve and one collection listing must succeed.
async fn health(connection: Result<Connection, PluginError>) -> Result<String, PluginError> {
    let ids = connection?.client.list_collection_ids(1).await.inspect_err(|e| {
        tracing::error!(error = %e, "health check failed");
    })?;
    tracing::debug!(collections = ids.len(), "health check passed");
    Ok("Data source is working".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use error::ErrorKind;
    use serde_json::json;

    #[tokio::test]
    async fn test_health_without_settings() {
        let err = health(FirestorePlugin::new().connect(None)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.message(), "missing data source settings");
    }

    #[tokio::test]
    async fn test_health_with_invalid_settings() {
        let plugin = FirestorePlugin::new();

        let err = health(plugin.connect_with(&json!({"projectId": "  "}), &json!({}))).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.message(), "project Id is required");

        let secure = json!({"serviceAccount": "not json"});
        let err = health(plugin.connect_with(&json!({"projectId": "p"}), &secure)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.message(), "invalid service account, it is expected to be a JSON");
    }

    #[tokio::test]
    async fn test_health_reports_unreachable_endpoint() {
        let settings = FirestoreSettings::resolve(&json!({"projectId": "p"}), &json!({}), Some("127.0.0.1:9")).unwrap();
        let connection = Connection {
            client: FirestoreClient::connect(reqwest::Client::new(), &settings).unwrap(),
            query_timeout: settings.query_timeout,
        };
        let err = health(Ok(connection)).await.unwrap_err();
        assert_ne!(err.kind(), ErrorKind::Validation);
        assert!(err.message().starts_with("listCollectionIds"), "{err}");
    }
}
