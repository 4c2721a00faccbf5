use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tracing::instrument;

use loupe_core::ids::{CommandId, ConnectionId, SessionId};
use loupe_core::kinds::{normalize_event_kind, DisconnectReason, EventKind};
use loupe_core::wire::{
    BatchedEvent, CaptureResultFrame, EventBatchFrame, EventFrame, InboundFrame,
    OutboundFrame, SessionEndFrame, SessionStartFrame,
};
use loupe_redact::Redactor;
use loupe_session::{LiveConsoleEntry, SessionRegistry};
use loupe_store::store::InboundEvent;
use loupe_store::sessions::NewSession;
use loupe_store::Store;

use crate::connection::ConnectionRegistry;
use crate::error::IngestError;

pub fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_millis() as i64
}

/// Everything a frame handler needs: the durable store, the redactor, the
/// live session registry, and the set of open sockets (spec.md §4.5).
#[derive(Clone)]
pub struct IngestContext {
    pub store: Store,
    pub redactor: Redactor,
    pub sessions: Arc<SessionRegistry>,
    pub connections: Arc<ConnectionRegistry>,
}

/// Dispatches one inbound frame for `connection_id`, returning a direct
/// reply frame if one is owed (only `ping` has one — everything else is
/// fire-and-forget or answered asynchronously via `capture_command`).
#[instrument(skip(ctx, frame))]
pub fn dispatch_frame(
    ctx: &IngestContext,
    connection_id: &ConnectionId,
    frame: InboundFrame,
) -> Result<Option<OutboundFrame>, IngestError> {
    let now = now_ms();
    ctx.connections.touch(connection_id, now);

    match frame {
        InboundFrame::Ping => Ok(Some(OutboundFrame::Pong)),
        InboundFrame::Pong => Ok(None),
        InboundFrame::SessionStart(f) => {
            handle_session_start(ctx, connection_id, f, now)?;
            Ok(None)
        }
        InboundFrame::SessionEnd(f) => {
            handle_session_end(ctx, connection_id, f, now)?;
            Ok(None)
        }
        InboundFrame::Event(f) => {
            handle_event(ctx, f)?;
            Ok(None)
        }
        InboundFrame::EventBatch(f) => {
            handle_event_batch(ctx, f)?;
            Ok(None)
        }
        InboundFrame::CaptureResult(f) => {
            handle_capture_result(ctx, f);
            Ok(None)
        }
    }
}

fn handle_session_start(
    ctx: &IngestContext,
    connection_id: &ConnectionId,
    f: SessionStartFrame,
    now: i64,
) -> Result<(), IngestError> {
    let session_id = SessionId::from_raw(f.session_id);
    ctx.store.sessions().create(
        Some(session_id.clone()),
        NewSession {
            url: f.url,
            tab_ids: f.tab_id.into_iter().collect(),
            window_id: f.window_id,
            user_agent: f.user_agent,
            viewport_width: f.viewport.as_ref().map(|v| v.width),
            viewport_height: f.viewport.as_ref().map(|v| v.height),
            dpr: f.dpr,
            safe_mode: f.safe_mode,
        },
        now,
    )?;

    if let Some(tab_id) = f.tab_id {
        ctx.sessions.add_tab(&session_id, tab_id);
    }
    ctx.sessions.bind_connection(&session_id, connection_id.clone(), now);
    ctx.connections.bind_session(connection_id, session_id);
    Ok(())
}

fn handle_session_end(
    ctx: &IngestContext,
    connection_id: &ConnectionId,
    f: SessionEndFrame,
    now: i64,
) -> Result<(), IngestError> {
    let session_id = SessionId::from_raw(f.session_id);
    ctx.store.sessions().end(&session_id, now)?;
    if ctx.connections.bound_session(connection_id).as_ref() == Some(&session_id) {
        ctx.sessions.unbind_connection(&session_id, DisconnectReason::ManualStop, now);
    }
    Ok(())
}

fn handle_event(ctx: &IngestContext, f: EventFrame) -> Result<(), IngestError> {
    let session_id = SessionId::from_raw(f.session_id);
    require_session(ctx, &session_id)?;
    ingest_one(ctx, &session_id, f.event_type, f.data, f.timestamp, f.tab_id, f.origin)
}

fn handle_event_batch(ctx: &IngestContext, f: EventBatchFrame) -> Result<(), IngestError> {
    let session_id = SessionId::from_raw(f.session_id);
    require_session(ctx, &session_id)?;
    for BatchedEvent { event_type, data, timestamp, tab_id, origin } in f.events {
        ingest_one(ctx, &session_id, event_type, data, timestamp, tab_id, origin)?;
    }
    Ok(())
}

fn handle_capture_result(ctx: &IngestContext, f: CaptureResultFrame) {
    let command_id = CommandId::from_raw(f.command_id);
    let payload = if f.ok {
        f.payload.unwrap_or(Value::Null)
    } else {
        serde_json::json!({ "error": f.error.unwrap_or_else(|| "capture failed".to_string()) })
    };
    // An unknown command id means it already expired or the connection that
    // owned it was unbound first; either way there is nothing left to do.
    ctx.sessions.resolve_pending(&command_id, payload);
}

fn require_session(ctx: &IngestContext, session_id: &SessionId) -> Result<(), IngestError> {
    if ctx.store.sessions().exists(session_id)? {
        Ok(())
    } else {
        Err(IngestError::SessionNotFound(session_id.to_string()))
    }
}

/// Redacts, persists, and — for console/error kinds — mirrors one event
/// into the session's live console ring (spec.md §4.3, §4.5).
fn ingest_one(
    ctx: &IngestContext,
    session_id: &SessionId,
    wire_event_type: String,
    data: Value,
    timestamp: i64,
    tab_id: Option<i64>,
    origin: Option<String>,
) -> Result<(), IngestError> {
    let Some(redacted) = ctx.redactor.redact_event(&wire_event_type, data) else {
        return Ok(());
    };

    let kind = normalize_event_kind(&wire_event_type);
    if matches!(kind, EventKind::Console | EventKind::Error) {
        ctx.sessions.push_console_entry(session_id, console_entry_from(&redacted, timestamp, tab_id, origin.clone(), kind));
    }
    if kind == EventKind::Nav {
        if let Some(url) = nav_target_url(&redacted) {
            ctx.store.sessions().update_latest_url(session_id, url)?;
        }
    }

    ctx.store.insert_event_batch(
        session_id,
        vec![InboundEvent { id: None, timestamp, wire_event_type, tab_id, payload: redacted }],
    )?;
    Ok(())
}

/// Extracts the destination URL from a `navigation` event's payload, checked
/// under the same key set `event_matches_origin` uses for origin matching.
fn nav_target_url(payload: &Value) -> Option<&str> {
    ["to", "url", "href"].iter().find_map(|key| payload.get(*key).and_then(|v| v.as_str()))
}

fn console_entry_from(
    payload: &Value,
    timestamp: i64,
    tab_id: Option<i64>,
    origin: Option<String>,
    kind: EventKind,
) -> LiveConsoleEntry {
    let level = payload
        .get("level")
        .and_then(|v| v.as_str())
        .unwrap_or(if kind == EventKind::Error { "error" } else { "log" })
        .to_string();
    let message = payload.get("message").and_then(|v| v.as_str()).unwrap_or("").to_string();
    let args = payload.get("args").and_then(|v| v.as_array()).cloned().unwrap_or_default();

    LiveConsoleEntry {
        timestamp,
        level,
        message,
        args,
        tab_id,
        origin,
        is_runtime_error: kind == EventKind::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loupe_core::wire::Viewport;

    fn test_ctx() -> IngestContext {
        IngestContext {
            store: Store::in_memory().unwrap(),
            redactor: Redactor::new(false),
            sessions: Arc::new(SessionRegistry::new()),
            connections: Arc::new(ConnectionRegistry::new()),
        }
    }

    #[test]
    fn ping_replies_with_pong() {
        let ctx = test_ctx();
        let conn = ConnectionId::new();
        let reply = dispatch_frame(&ctx, &conn, InboundFrame::Ping).unwrap();
        assert!(matches!(reply, Some(OutboundFrame::Pong)));
    }

    #[test]
    fn session_start_creates_session_and_binds_connection() {
        let ctx = test_ctx();
        let (conn, _rx) = ctx.connections.register(0);
        dispatch_frame(
            &ctx,
            &conn,
            InboundFrame::SessionStart(SessionStartFrame {
                session_id: "sess-test-1".into(),
                url: "https://a.test".into(),
                tab_id: Some(7),
                window_id: None,
                user_agent: None,
                viewport: Some(Viewport { width: 1280, height: 800 }),
                dpr: Some(2.0),
                safe_mode: false,
            }),
        )
        .unwrap();

        let sid = SessionId::from_raw("sess-test-1");
        assert!(ctx.store.sessions().exists(&sid).unwrap());
        assert!(ctx.sessions.is_connected(&sid));
    }

    #[test]
    fn event_for_unknown_session_errors() {
        let ctx = test_ctx();
        let conn = ConnectionId::new();
        let result = dispatch_frame(
            &ctx,
            &conn,
            InboundFrame::Event(EventFrame {
                session_id: "sess-missing".into(),
                event_type: "console".into(),
                data: serde_json::json!({"message": "hi"}),
                timestamp: 1,
                tab_id: None,
                origin: None,
            }),
        );
        assert!(matches!(result, Err(IngestError::SessionNotFound(_))));
    }

    #[test]
    fn console_event_mirrors_into_live_buffer() {
        let ctx = test_ctx();
        let sid = SessionId::from_raw("sess-test-2");
        ctx.store.sessions().create(
            Some(sid.clone()),
            NewSession {
                url: "https://a.test".into(),
                tab_ids: vec![1],
                window_id: None,
                user_agent: None,
                viewport_width: None,
                viewport_height: None,
                dpr: None,
                safe_mode: false,
            },
            0,
        ).unwrap();

        dispatch_frame(
            &ctx,
            &ConnectionId::new(),
            InboundFrame::Event(EventFrame {
                session_id: sid.as_str().to_string(),
                event_type: "console".into(),
                data: serde_json::json!({"level": "warn", "message": "careful"}),
                timestamp: 5,
                tab_id: Some(1),
                origin: None,
            }),
        )
        .unwrap();

        let entries = ctx.sessions.query_console(&sid, &Default::default());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, "warn");
        assert_eq!(entries[0].message, "careful");
    }

    #[test]
    fn capture_result_resolves_pending_by_id() {
        let ctx = test_ctx();
        let sid = SessionId::new();
        let (command_id, rx) = ctx.sessions.register_pending(&sid);

        dispatch_frame(
            &ctx,
            &ConnectionId::new(),
            InboundFrame::CaptureResult(CaptureResultFrame {
                command_id: command_id.as_str().to_string(),
                session_id: sid.as_str().to_string(),
                ok: true,
                payload: Some(serde_json::json!({"dom": "<html/>"})),
                truncated: Some(false),
                error: None,
            }),
        )
        .unwrap();

        let payload = rx.blocking_recv().unwrap();
        assert_eq!(payload["dom"], "<html/>");
    }
}
