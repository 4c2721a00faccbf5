use std::time::Duration;

use serde_json::Value;
use tracing::instrument;

use loupe_core::ids::SessionId;
use loupe_core::wire::{CaptureCommandFrame, OutboundFrame, CAPTURE_COMMANDS};

use crate::dispatch::IngestContext;
use crate::error::IngestError;

/// Default timeout for a live capture round-trip when the caller doesn't
/// specify one (spec.md §4.6 `SendCapture`).
pub const DEFAULT_CAPTURE_TIMEOUT_MS: u64 = 5000;

/// `SendCapture` (spec.md §4.5/§4.6): push a capture command down the
/// connection bound to `session_id` and wait for the matching
/// `capture_result` to resolve the pending slot, or time out.
#[instrument(skip(ctx, payload))]
pub async fn send_capture(
    ctx: &IngestContext,
    session_id: &SessionId,
    command: &str,
    payload: Value,
    timeout_ms: Option<u64>,
) -> Result<Value, IngestError> {
    if !CAPTURE_COMMANDS.contains(&command) {
        return Err(IngestError::InvalidMessage(format!("unrecognized capture command {command}")));
    }

    let connection_id = ctx
        .sessions
        .bound_connection(session_id)
        .ok_or_else(|| IngestError::NotConnected(session_id.to_string()))?;

    let (command_id, rx) = ctx.sessions.register_pending(session_id);
    let timeout_ms = timeout_ms.unwrap_or(DEFAULT_CAPTURE_TIMEOUT_MS);

    let sent = ctx.connections.send_to(
        &connection_id,
        OutboundFrame::CaptureCommand(CaptureCommandFrame {
            command_id: command_id.as_str().to_string(),
            session_id: session_id.as_str().to_string(),
            command: command.to_string(),
            payload,
            timeout_ms: Some(timeout_ms),
        }),
    );
    if !sent {
        ctx.sessions.expire_pending(&command_id);
        return Err(IngestError::NotConnected(session_id.to_string()));
    }

    match tokio::time::timeout(Duration::from_millis(timeout_ms), rx).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(_)) => Err(IngestError::ConnectionClosed),
        Err(_) => {
            ctx.sessions.expire_pending(&command_id);
            Err(IngestError::CaptureTimeout(timeout_ms))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use loupe_core::ids::ConnectionId;
    use loupe_core::wire::InboundFrame;
    use loupe_redact::Redactor;
    use loupe_session::SessionRegistry;
    use loupe_store::Store;

    use crate::connection::ConnectionRegistry;
    use crate::dispatch::dispatch_frame;

    fn test_ctx() -> IngestContext {
        IngestContext {
            store: Store::in_memory().unwrap(),
            redactor: Redactor::new(false),
            sessions: Arc::new(SessionRegistry::new()),
            connections: Arc::new(ConnectionRegistry::new()),
        }
    }

    #[tokio::test]
    async fn unbound_session_is_not_connected() {
        let ctx = test_ctx();
        let result = send_capture(&ctx, &SessionId::new(), "CAPTURE_UI_SNAPSHOT", serde_json::json!({}), None).await;
        assert!(matches!(result, Err(IngestError::NotConnected(_))));
    }

    #[tokio::test]
    async fn rejects_unrecognized_command() {
        let ctx = test_ctx();
        let result = send_capture(&ctx, &SessionId::new(), "NOT_A_REAL_COMMAND", serde_json::json!({}), None).await;
        assert!(matches!(result, Err(IngestError::InvalidMessage(_))));
    }

    #[tokio::test]
    async fn resolves_when_capture_result_arrives() {
        let ctx = test_ctx();
        let (conn_id, mut rx) = ctx.connections.register(0);
        let sid = SessionId::new();
        ctx.sessions.bind_connection(&sid, conn_id.clone(), 0);
        ctx.connections.bind_session(&conn_id, sid.clone());

        let ctx2 = ctx.clone();
        let sid2 = sid.clone();
        let capture = tokio::spawn(async move {
            send_capture(&ctx2, &sid2, "CAPTURE_UI_SNAPSHOT", serde_json::json!({}), Some(1000)).await
        });

        let outbound = rx.recv().await.expect("capture command sent");
        let OutboundFrame::CaptureCommand(frame) = outbound else { panic!("expected capture command") };

        dispatch_frame(
            &ctx,
            &ConnectionId::new(),
            InboundFrame::CaptureResult(loupe_core::wire::CaptureResultFrame {
                command_id: frame.command_id,
                session_id: sid.as_str().to_string(),
                ok: true,
                payload: Some(serde_json::json!({"png": "data:image/png;base64,iVBOR"})),
                truncated: Some(false),
                error: None,
            }),
        )
        .unwrap();

        let result = capture.await.unwrap().unwrap();
        assert_eq!(result["png"], "data:image/png;base64,iVBOR");
    }

    #[tokio::test]
    async fn times_out_and_expires_pending_slot() {
        let ctx = test_ctx();
        let (conn_id, _rx) = ctx.connections.register(0);
        let sid = SessionId::new();
        ctx.sessions.bind_connection(&sid, conn_id.clone(), 0);
        ctx.connections.bind_session(&conn_id, sid.clone());

        let result = send_capture(&ctx, &sid, "CAPTURE_DOM_SUBTREE", serde_json::json!({}), Some(20)).await;
        assert!(matches!(result, Err(IngestError::CaptureTimeout(20))));
    }
}
