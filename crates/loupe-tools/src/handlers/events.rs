use serde_json::{json, Value};

use loupe_core::ids::SessionId;
use loupe_core::kinds::EventKind;
use loupe_store::events::EventFilter;

use crate::context::ToolContext;
use crate::envelope::envelope;
use crate::error::ToolsError;
use crate::pagination::Page;
use crate::validate::{normalize_url_filter, opt_i64, opt_str, opt_u32, require_str};

const DEFAULT_EVENTS_LIMIT: u32 = 50;

/// Resolves the `sessionId`/`url` filter pair shared by `get_recent_events`,
/// `get_navigation_history`, and `get_console_events` (spec.md §4.7: "at
/// least one required"; `url` normalizes to its origin).
fn session_or_origin(args: &Value) -> Result<(Option<SessionId>, Option<String>), ToolsError> {
    let session_id = opt_str(args, "sessionId").map(SessionId::from_raw);
    let origin = opt_str(args, "url").map(normalize_url_filter).transpose()?;
    if session_id.is_none() && origin.is_none() {
        return Err(ToolsError::InvalidInput("sessionId or url is required".into()));
    }
    Ok((session_id, origin))
}

fn parse_kinds(args: &Value) -> Option<Vec<EventKind>> {
    args.get("kinds").and_then(Value::as_array).map(|arr| {
        arr.iter()
            .filter_map(Value::as_str)
            .filter_map(|s| s.parse::<EventKind>().ok())
            .collect()
    })
}

fn events_envelope(
    session_id: Option<&SessionId>,
    limit: u32,
    truncated: bool,
    rows: Vec<loupe_store::events::EventRow>,
) -> Result<Value, ToolsError> {
    let events = rows
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(loupe_store::StoreError::from)?;
    Ok(envelope(session_id.map(SessionId::as_str), limit, truncated, json!({ "events": events })))
}

/// `get_recent_events` (spec.md §4.7).
pub fn get_recent_events(ctx: &ToolContext, args: &Value) -> Result<Value, ToolsError> {
    let (session_id, origin) = session_or_origin(args)?;
    let page = Page::new(opt_u32(args, "limit"), opt_u32(args, "offset"), DEFAULT_EVENTS_LIMIT);
    let filter = EventFilter {
        session_id: session_id.clone(),
        origin,
        kinds: parse_kinds(args),
        since_ts: opt_i64(args, "sinceTs"),
        until_ts: opt_i64(args, "untilTs"),
    };

    let rows = ctx.store.events().list(&filter, page.fetch_limit(), page.offset)?;
    let (rows, truncated) = page.truncate(rows);
    events_envelope(session_id.as_ref(), page.limit, truncated, rows)
}

/// `get_navigation_history` (spec.md §4.7): same filter semantics as
/// `get_recent_events`, pinned to nav events.
pub fn get_navigation_history(ctx: &ToolContext, args: &Value) -> Result<Value, ToolsError> {
    let (session_id, origin) = session_or_origin(args)?;
    let page = Page::new(opt_u32(args, "limit"), opt_u32(args, "offset"), DEFAULT_EVENTS_LIMIT);
    let filter = EventFilter {
        session_id: session_id.clone(),
        origin,
        kinds: Some(vec![EventKind::Nav]),
        since_ts: opt_i64(args, "sinceTs"),
        until_ts: opt_i64(args, "untilTs"),
    };

    let rows = ctx.store.events().list(&filter, page.fetch_limit(), page.offset)?;
    let (rows, truncated) = page.truncate(rows);
    events_envelope(session_id.as_ref(), page.limit, truncated, rows)
}

/// `get_console_events` (spec.md §4.7): same filter semantics, pinned to
/// console events, with an optional post-fetch `level` filter (level lives
/// inside the event payload, not a column, same as the origin filter).
pub fn get_console_events(ctx: &ToolContext, args: &Value) -> Result<Value, ToolsError> {
    let (session_id, origin) = session_or_origin(args)?;
    let page = Page::new(opt_u32(args, "limit"), opt_u32(args, "offset"), DEFAULT_EVENTS_LIMIT);
    let filter = EventFilter {
        session_id: session_id.clone(),
        origin,
        kinds: Some(vec![EventKind::Console]),
        since_ts: opt_i64(args, "sinceTs"),
        until_ts: opt_i64(args, "untilTs"),
    };

    let mut rows = ctx.store.events().list(&filter, page.fetch_limit(), page.offset)?;
    if let Some(level) = opt_str(args, "level") {
        rows.retain(|r| r.payload.get("level").and_then(Value::as_str) == Some(level));
    }
    let (rows, truncated) = page.truncate(rows);
    events_envelope(session_id.as_ref(), page.limit, truncated, rows)
}

/// `get_element_refs` (spec.md §4.7): element-reference events for a
/// session matching a CSS selector recorded on capture (selector lives in
/// the payload, filtered the same way console `level` is).
pub fn get_element_refs(ctx: &ToolContext, args: &Value) -> Result<Value, ToolsError> {
    let session_id = SessionId::from_raw(require_str(args, "sessionId")?);
    let selector = require_str(args, "selector")?;
    let page = Page::new(opt_u32(args, "limit"), opt_u32(args, "offset"), DEFAULT_EVENTS_LIMIT);

    let filter = EventFilter {
        session_id: Some(session_id.clone()),
        kinds: Some(vec![EventKind::ElementRef]),
        ..Default::default()
    };
    const SCAN_LIMIT: u32 = 10_000;
    let mut rows = ctx.store.events().list(&filter, SCAN_LIMIT, 0)?;
    rows.retain(|r| r.payload.get("selector").and_then(Value::as_str) == Some(selector));
    let page_rows: Vec<_> = rows
        .into_iter()
        .skip(page.offset as usize)
        .take(page.fetch_limit() as usize)
        .collect();
    let (page_rows, truncated) = page.truncate(page_rows);
    events_envelope(Some(&session_id), page.limit, truncated, page_rows)
}
