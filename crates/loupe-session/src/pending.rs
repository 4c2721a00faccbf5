use tokio::sync::oneshot;

use loupe_core::ids::CommandId;

/// One in-flight `SendCapture` call (spec.md §3 `PendingCaptureRequest`,
/// §4.5). The registry owns the resolver half; the ingest pipeline's
/// `capture_result` handler (or the disconnect path) consumes it exactly
/// once via [`crate::registry::SessionRegistry::resolve_pending`] or
/// [`crate::registry::SessionRegistry::reject_session_pending`].
pub struct PendingCaptureRequest {
    pub command_id: CommandId,
    resolver: oneshot::Sender<serde_json::Value>,
}

impl PendingCaptureRequest {
    pub fn new(command_id: CommandId, resolver: oneshot::Sender<serde_json::Value>) -> Self {
        Self { command_id, resolver }
    }

    pub fn resolve(self, payload: serde_json::Value) {
        let _ = self.resolver.send(payload);
    }
}
