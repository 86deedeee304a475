//! Error types for the overlay store

use crate::backend::BackendError;

/// Error type for metadata store operations
#[derive(Debug, thiserror::Error)]
pub enum MetaStoreError {
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("malformed key: '{0}'")]
    MalformedKey(String),

    #[error("unsupported backend: '{0}'")]
    UnsupportedBackend(String),

    #[error("invalid store configuration: {0}")]
    Config(String),

    #[error("{op} '{key}' failed: {source}")]
    Backend {
        op: &'static str,
        key: String,
        #[source]
        source: BackendError,
    },

    #[error("list '{key}' failed: {source}")]
    List {
        key: String,
        #[source]
        source: BackendError,
    },

    #[error("failed to (de)serialize '{key}': {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl MetaStoreError {
    /// Whether the failure means the key or prefix holds nothing
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        match self {
            Self::Backend { source, .. } | Self::List { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    pub(crate) fn backend(op: &'static str, key: impl Into<String>, source: BackendError) -> Self {
        Self::Backend {
            op,
            key: key.into(),
            source,
        }
    }
}

pub type MetaStoreResult<T> = Result<T, MetaStoreError>;
