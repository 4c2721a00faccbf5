use serde_json::{json, Value};

use loupe_core::ids::SessionId;
use loupe_core::kinds::EventKind;
use loupe_store::events::EventFilter;
use loupe_store::sessions::SessionRow;

use crate::context::ToolContext;
use crate::envelope::envelope;
use crate::error::ToolsError;
use crate::pagination::Page;
use crate::validate::{opt_i64, opt_u32, require_str};

const DEFAULT_LIST_LIMIT: u32 = 25;

/// Rows matching a session are capped by this when a handler needs "all of
/// them" to compute a count rather than a page (spec.md §4.7
/// `get_session_summary`); the store has no dedicated count-by-kind query,
/// so handlers fetch generously and count in Rust the same way origin
/// filtering already happens after the SQL fetch.
const SUMMARY_SCAN_LIMIT: u32 = 100_000;

fn session_to_json(ctx: &ToolContext, row: SessionRow) -> Value {
    let sid = row.id.clone();
    let mut value = serde_json::to_value(&row).expect("SessionRow always serializes");
    let live = if ctx.ingest.sessions.is_connected(&sid) {
        let state = ctx.ingest.sessions.connection_state(&sid);
        json!({
            "connected": true,
            "connectedAt": state.as_ref().and_then(|s| s.connected_at),
            "lastHeartbeatAt": state.as_ref().and_then(|s| s.last_heartbeat_at),
        })
    } else {
        json!({ "connected": false })
    };
    if let Value::Object(map) = &mut value {
        map.insert("live".to_string(), live);
    }
    value
}

/// `list_sessions` (spec.md §4.7): recent sessions, newest first, each
/// enriched with live-connection metadata from the Session Registry.
pub fn list_sessions(ctx: &ToolContext, args: &Value) -> Result<Value, ToolsError> {
    let since_minutes = opt_i64(args, "sinceMinutes");
    let page = Page::new(opt_u32(args, "limit"), opt_u32(args, "offset"), DEFAULT_LIST_LIMIT);
    let now = loupe_ingest::now_ms();

    let rows = ctx
        .store
        .sessions()
        .list_recent(since_minutes, page.fetch_limit(), page.offset, now)?;
    let (rows, truncated) = page.truncate(rows);
    let sessions: Vec<Value> = rows.into_iter().map(|r| session_to_json(ctx, r)).collect();

    Ok(envelope(None, page.limit, truncated, json!({ "sessions": sessions })))
}

/// `get_session_summary` (spec.md §4.7): error/console-warn/network-failure
/// counts, the session's overall event time range, and its last known URL.
pub fn get_session_summary(ctx: &ToolContext, args: &Value) -> Result<Value, ToolsError> {
    let session_id = SessionId::from_raw(require_str(args, "sessionId")?);
    let session = ctx.store.sessions().get(&session_id)?;

    let time_range = ctx.store.events().time_range_for_session(&session_id)?;

    let error_count: i64 = ctx
        .store
        .fingerprints()
        .list_for_session(&session_id, SUMMARY_SCAN_LIMIT, 0)?
        .iter()
        .map(|fp| fp.count)
        .sum();

    let console_warn_count = ctx
        .store
        .events()
        .list(
            &EventFilter { session_id: Some(session_id.clone()), kinds: Some(vec![EventKind::Console]), ..Default::default() },
            SUMMARY_SCAN_LIMIT,
            0,
        )?
        .iter()
        .filter(|row| row.payload.get("level").and_then(Value::as_str) == Some("warn"))
        .count() as i64;

    let network_failure_count =
        ctx.store.network().list_failures(&session_id, SUMMARY_SCAN_LIMIT, 0)?.len() as i64;

    Ok(envelope(
        Some(session_id.as_str()),
        1,
        false,
        json!({
            "errorCount": error_count,
            "consoleWarnCount": console_warn_count,
            "networkFailureCount": network_failure_count,
            "timeRange": time_range.map(|(min, max)| json!({"start": min, "end": max})),
            "lastUrl": session.latest_url,
            "pinned": session.pinned,
        }),
    ))
}
