use loupe_core::errors::{kind, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum RetentionError {
    #[error(transparent)]
    Store(#[from] loupe_store::StoreError),

    #[error("export/import error: {0}")]
    Archive(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("missing snapshot asset referenced in manifest: {0}")]
    MissingAsset(String),
}

impl ErrorKind for RetentionError {
    fn error_kind(&self) -> &'static str {
        match self {
            RetentionError::Store(e) => e.error_kind(),
            RetentionError::Archive(_) => kind::INTERNAL_ERROR,
            RetentionError::SessionNotFound(_) => kind::SESSION_NOT_FOUND,
            RetentionError::MissingAsset(_) => kind::SNAPSHOT_ASSET_MISSING,
        }
    }
}
