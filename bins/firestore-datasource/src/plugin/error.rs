use grafana_plugin_sdk::backend;

use frame_engine::ConvertError;

// ═══════════════════════════════════════════════════════════════
//  Error kinds
// ═══════════════════════════════════════════════════════════════

/// Category of a per-query failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed query payload or missing required setting.
    Validation,
    /// Authentication or connection failure.
    Connection,
    /// Filter or SQL string rejected by Firestore.
    Execution,
    /// A structured value could not be serialized.
    Encoding,
    /// Timed out or cancelled before the frame was complete.
    Cancelled,
    /// Any other unexpected fault, including caught panics.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Validation => f.write_str("validation"),
            ErrorKind::Connection => f.write_str("connection"),
            ErrorKind::Execution => f.write_str("query execution"),
            ErrorKind::Encoding => f.write_str("encoding"),
            ErrorKind::Cancelled => f.write_str("cancelled"),
            ErrorKind::Internal => f.write_str("internal"),
        }
    }
}

/// Error for one query, tagged with its kind.
#[derive(Clone, PartialEq, Eq)]
pub struct PluginError {
    kind: ErrorKind,
    message: String,
}

impl PluginError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Validation, message: msg.into() }
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Connection, message: msg.into() }
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Execution, message: msg.into() }
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Cancelled, message: msg.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Internal, message: msg.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Produces `"context: original message"`, keeping the kind.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{ctx}: {}", self.message),
        }
    }
}

impl std::fmt::Debug for PluginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::fmt::Display for PluginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}

impl std::error::Error for PluginError {}

impl From<ConvertError> for PluginError {
    fn from(e: ConvertError) -> Self {
        let kind = if e.is_encoding() { ErrorKind::Encoding } else { ErrorKind::Internal };
        Self { kind, message: e.to_string() }
    }
}

// ═══════════════════════════════════════════════════════════════
//  QueryError: what the SDK sees per ref id
// ═══════════════════════════════════════════════════════════════

/// Grafana plugin error for individual queries.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct QueryError {
    pub ref_id: String,
    pub error: PluginError,
}

impl QueryError {
    pub fn new(ref_id: impl Into<String>, error: PluginError) -> Self {
        Self { ref_id: ref_id.into(), error }
    }
}

impl backend::DataQueryError for QueryError {
    fn ref_id(self) -> String {
        self.ref_id
    }
}
