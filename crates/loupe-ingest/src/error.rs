use loupe_core::errors::{kind, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("unknown frame type")]
    UnknownType,

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error(transparent)]
    Store(#[from] loupe_store::StoreError),

    #[error("no connection bound to session {0}")]
    NotConnected(String),

    #[error("capture command timed out after {0}ms")]
    CaptureTimeout(u64),

    #[error("connection closed before capture completed")]
    ConnectionClosed,
}

impl ErrorKind for IngestError {
    fn error_kind(&self) -> &'static str {
        match self {
            IngestError::InvalidMessage(_) => kind::INVALID_MESSAGE,
            IngestError::UnknownType => kind::UNKNOWN_TYPE,
            IngestError::SessionNotFound(_) => kind::SESSION_NOT_FOUND,
            IngestError::Store(e) => e.error_kind(),
            IngestError::NotConnected(_) => kind::LIVE_SESSION_DISCONNECTED,
            IngestError::CaptureTimeout(_) => kind::CAPTURE_TIMEOUT,
            IngestError::ConnectionClosed => kind::LIVE_SESSION_DISCONNECTED,
        }
    }
}
