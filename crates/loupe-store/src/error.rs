use loupe_core::errors::{kind, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(String),

    #[error("corrupt row in {table}.{column}: {detail}")]
    CorruptRow {
        table: &'static str,
        column: &'static str,
        detail: String,
    },

    #[error("snapshot {kind} exceeds size budget: {actual} > {limit} bytes")]
    SnapshotSizeExceeded {
        kind: &'static str,
        actual: usize,
        limit: usize,
    },

    #[error("snapshot asset missing: {0}")]
    SnapshotAssetMissing(String),

    #[error("path traversal rejected: {0}")]
    PathTraversal(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl ErrorKind for StoreError {
    fn error_kind(&self) -> &'static str {
        match self {
            StoreError::Database(_) | StoreError::Io(_) | StoreError::Serialization(_) => {
                kind::INTERNAL_ERROR
            }
            StoreError::NotFound(_) => kind::SESSION_NOT_FOUND,
            StoreError::Conflict(_) => kind::INTERNAL_ERROR,
            StoreError::CorruptRow { .. } => kind::INTERNAL_ERROR,
            StoreError::SnapshotSizeExceeded { .. } => kind::SNAPSHOT_SIZE_EXCEEDED,
            StoreError::SnapshotAssetMissing(_) | StoreError::PathTraversal(_) => {
                kind::SNAPSHOT_ASSET_MISSING
            }
        }
    }
}
