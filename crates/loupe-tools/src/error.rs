use loupe_core::errors::{kind, looks_like_disconnect, ErrorKind};
use loupe_ingest::IngestError;
use loupe_store::StoreError;
use serde_json::Value;

/// Errors a tool call can fail with (spec.md §4.7, §7). Every variant maps
/// onto the shared `kind` taxonomy so the JSON-RPC transport can attach a
/// stable `code` alongside the human-readable message.
#[derive(Debug, thiserror::Error)]
pub enum ToolsError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("live session disconnected")]
    LiveSessionDisconnected,

    /// The extension answered the capture command with `ok: false`; `0` is
    /// its free-text error, kept as-is once it's been ruled out as a
    /// disconnect (spec.md §4.5 `capture_result`).
    #[error("capture failed: {0}")]
    CaptureFailed(String),
}

impl ErrorKind for ToolsError {
    fn error_kind(&self) -> &'static str {
        match self {
            ToolsError::UnknownTool(_) => kind::UNKNOWN_TYPE,
            ToolsError::InvalidInput(_) => kind::TOOL_INPUT_VALIDATION,
            ToolsError::Store(e) => e.error_kind(),
            ToolsError::Ingest(e) => e.error_kind(),
            ToolsError::LiveSessionDisconnected => kind::LIVE_SESSION_DISCONNECTED,
            ToolsError::CaptureFailed(_) => kind::INTERNAL_ERROR,
        }
    }
}

/// Every V2 tool funnels its `send_capture` result through this (spec.md
/// §4.7 "every live tool normalizes... into a single LIVE_SESSION_DISCONNECTED
/// kind"). `IngestError` already classifies connection-level failures
/// (timeout, not-connected) correctly on its own; what needs normalizing here
/// is the extension's own free-text `error` field on a `capture_result` with
/// `ok: false`, which `send_capture` surfaces as `Ok({"error": "..."})`
/// rather than an `Err` (see `loupe_ingest::dispatch::handle_capture_result`).
pub fn normalize_capture_result(result: Result<Value, IngestError>) -> Result<Value, ToolsError> {
    let value = result?;
    if let Some(message) = value.get("error").and_then(Value::as_str) {
        return Err(if looks_like_disconnect(message) {
            ToolsError::LiveSessionDisconnected
        } else {
            ToolsError::CaptureFailed(message.to_string())
        });
    }
    Ok(value)
}
