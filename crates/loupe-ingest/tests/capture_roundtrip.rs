use std::sync::Arc;

use loupe_core::ids::{ConnectionId, SessionId};
use loupe_core::wire::{CaptureResultFrame, InboundFrame, OutboundFrame};
use loupe_ingest::{dispatch_frame, send_capture, ConnectionRegistry, IngestContext};
use loupe_redact::Redactor;
use loupe_session::SessionRegistry;
use loupe_store::Store;

fn ctx() -> IngestContext {
    IngestContext {
        store: Store::in_memory().unwrap(),
        redactor: Redactor::new(false),
        sessions: Arc::new(SessionRegistry::new()),
        connections: Arc::new(ConnectionRegistry::new()),
    }
}

/// A live tool handler's `send_capture` call must cross all the way into
/// the connection it's bound to and resolve from a `capture_result` frame
/// dispatched on a *different* connection handle, exactly as it would when
/// a real websocket read loop calls `dispatch_frame` (spec.md §4.5, §4.6).
#[tokio::test]
async fn capture_command_round_trips_through_dispatch() {
    let ctx = ctx();
    let (conn_id, mut rx) = ctx.connections.register(0);
    let session_id = SessionId::new();
    ctx.sessions.bind_connection(&session_id, conn_id.clone(), 0);
    ctx.connections.bind_session(&conn_id, session_id.clone());

    let capture_ctx = ctx.clone();
    let capture_session = session_id.clone();
    let capture = tokio::spawn(async move {
        send_capture(
            &capture_ctx,
            &capture_session,
            "CAPTURE_DOM_SUBTREE",
            serde_json::json!({ "selector": "#root" }),
            Some(2000),
        )
        .await
    });

    let outbound = rx.recv().await.expect("capture command queued for the bound connection");
    let OutboundFrame::CaptureCommand(frame) = outbound else {
        panic!("expected a capture command frame");
    };
    assert_eq!(frame.session_id, session_id.as_str());

    dispatch_frame(
        &ctx,
        &ConnectionId::new(),
        InboundFrame::CaptureResult(CaptureResultFrame {
            command_id: frame.command_id,
            session_id: session_id.as_str().to_string(),
            ok: true,
            payload: Some(serde_json::json!({ "dom": { "tag": "div" } })),
            truncated: Some(false),
            error: None,
        }),
    )
    .unwrap();

    let result = capture.await.unwrap().unwrap();
    assert_eq!(result["dom"]["tag"], "div");
}

#[tokio::test]
async fn capture_fails_once_connection_is_unregistered() {
    let ctx = ctx();
    let (conn_id, _rx) = ctx.connections.register(0);
    let session_id = SessionId::new();
    ctx.sessions.bind_connection(&session_id, conn_id.clone(), 0);
    ctx.connections.bind_session(&conn_id, session_id.clone());
    ctx.connections.unregister(&conn_id);

    let result = send_capture(&ctx, &session_id, "CAPTURE_UI_SNAPSHOT", serde_json::json!({}), Some(50)).await;
    assert!(result.is_err());
}
