use crate::kind::Kind;

/// Conversion failure. Either one aborts the whole frame.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("column '{column}': encode structured value: {source}")]
    Encoding {
        column: String,
        source: serde_json::Error,
    },

    /// A value reached storage that the column kind does not absorb.
    #[error("column '{column}': {kind} column cannot hold a {value} value")]
    KindMismatch {
        column: String,
        kind: Kind,
        value: Kind,
    },
}

impl ConvertError {
    /// Attach the column name, keeping the variant.
    pub fn in_column(self, name: &str) -> Self {
        match self {
            ConvertError::Encoding { source, .. } => ConvertError::Encoding {
                column: name.to_string(),
                source,
            },
            ConvertError::KindMismatch { kind, value, .. } => ConvertError::KindMismatch {
                column: name.to_string(),
                kind,
                value,
            },
        }
    }

    pub fn is_encoding(&self) -> bool {
        matches!(self, ConvertError::Encoding { .. })
    }
}
