use std::time::Duration;

use serde::Deserialize;

use super::error::PluginError;

const DEFAULT_DATABASE: &str = "(default)";
const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;
const PRODUCTION_ENDPOINT: &str = "https://firestore.googleapis.com";
const EMULATOR_HOST_ENV: &str = "FIRESTORE_EMULATOR_HOST";

// ═══════════════════════════════════════════════════════════════
//  Instance settings
// ═══════════════════════════════════════════════════════════════

/// `jsonData` as stored by the config editor.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonData {
    #[serde(default, alias = "ProjectId")]
    project_id: String,
    #[serde(default)]
    database_id: Option<String>,
    #[serde(default)]
    query_timeout_secs: Option<u64>,
}

/// Resolved, validated connection settings for one data source instance.
#[derive(Clone)]
pub(crate) struct FirestoreSettings {
    pub project_id: String,
    pub database_id: String,
    /// Base URL without the API version, e.g. `https://firestore.googleapis.com`.
    pub endpoint: String,
    pub query_timeout: Duration,
    /// Service account key JSON. Absent means unauthenticated requests
    /// (emulator).
    pub service_account: Option<String>,
}

impl std::fmt::Debug for FirestoreSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirestoreSettings")
            .field("project_id", &self.project_id)
            .field("database_id", &self.database_id)
            .field("endpoint", &self.endpoint)
            .field("query_timeout", &self.query_timeout)
            .field("service_account", &self.service_account.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl FirestoreSettings {
    /// Settings from Grafana instance data, honouring `FIRESTORE_EMULATOR_HOST`.
    pub fn from_instance(
        json_data: &serde_json::Value,
        secure_json_data: &serde_json::Value,
    ) -> Result<Self, PluginError> {
        let emulator = std::env::var(EMULATOR_HOST_ENV).ok();
        Self::resolve(json_data, secure_json_data, emulator.as_deref())
    }

    pub fn resolve(
        json_data: &serde_json::Value,
        secure_json_data: &serde_json::Value,
        emulator_host: Option<&str>,
    ) -> Result<Self, PluginError> {
        let raw: JsonData = serde_json::from_value(json_data.clone())
            .map_err(|e| PluginError::validation(format!("ProjectID: {e}")))?;

        let project_id = raw.project_id.trim().to_string();
        if project_id.is_empty() {
            return Err(PluginError::validation("project Id is required"));
        }

        let service_account = secure_json_data
            .get("serviceAccount")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        if let Some(blob) = &service_account {
            if serde_json::from_str::<serde_json::Value>(blob).is_err() {
                return Err(PluginError::validation(
                    "invalid service account, it is expected to be a JSON",
                ));
            }
        }

        let endpoint = match emulator_host.map(str::trim).filter(|h| !h.is_empty()) {
            Some(host) if host.starts_with("http://") || host.starts_with("https://") => {
                host.trim_end_matches('/').to_string()
            }
            Some(host) => format!("http://{host}"),
            None => PRODUCTION_ENDPOINT.to_string(),
        };

        Ok(Self {
            project_id,
            database_id: raw
                .database_id
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            endpoint,
            query_timeout: Duration::from_secs(
                raw.query_timeout_secs
                    .filter(|s| *s > 0)
                    .unwrap_or(DEFAULT_QUERY_TIMEOUT_SECS),
            ),
            service_account,
        })
    }

    /// `projects/{project}/databases/{database}`
    pub fn database_path(&self) -> String {
        format!("projects/{}/databases/{}", self.project_id, self.database_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::error::ErrorKind;
    use serde_json::json;

    fn resolve(json_data: serde_json::Value, secure: serde_json::Value) -> Result<FirestoreSettings, PluginError> {
        FirestoreSettings::resolve(&json_data, &secure, None)
    }

    #[test]
    fn test_project_id_required() {
        let err = resolve(json!({}), json!({})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.message(), "project Id is required");

        let err = resolve(json!(null), json!({})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_legacy_project_id_key() {
        let s = resolve(json!({"ProjectId": "test"}), json!({})).unwrap();
        assert_eq!(s.project_id, "test");
        assert_eq!(s.database_path(), "projects/test/databases/(default)");
    }

    #[test]
    fn test_service_account_must_be_json() {
        let err = resolve(json!({"projectId": "test"}), json!({"serviceAccount": "test"})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let s = resolve(json!({"projectId": "test"}), json!({"serviceAccount": "{}"})).unwrap();
        assert_eq!(s.service_account.as_deref(), Some("{}"));
    }

    #[test]
    fn test_blank_service_account_is_absent() {
        let s = resolve(json!({"projectId": "test"}), json!({"serviceAccount": "  "})).unwrap();
        assert!(s.service_account.is_none());
    }

    #[test]
    fn test_defaults_and_overrides() {
        let s = resolve(json!({"projectId": "p"}), json!({})).unwrap();
        assert_eq!(s.endpoint, "https://firestore.googleapis.com");
        assert_eq!(s.query_timeout, Duration::from_secs(30));

        let s = resolve(
            json!({"projectId": "p", "databaseId": "analytics", "queryTimeoutSecs": 5}),
            json!({}),
        )
        .unwrap();
        assert_eq!(s.database_path(), "projects/p/databases/analytics");
        assert_eq!(s.query_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_emulator_host() {
        let s = FirestoreSettings::resolve(&json!({"projectId": "p"}), &json!({}), Some("localhost:8765")).unwrap();
        assert_eq!(s.endpoint, "http://localhost:8765");
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let s = resolve(json!({"projectId": "p"}), json!({"serviceAccount": "{\"private_key\": \"k\"}"})).unwrap();
        let dbg = format!("{s:?}");
        assert!(dbg.contains("<redacted>"));
        assert!(!dbg.contains("private_key"));
    }
}
