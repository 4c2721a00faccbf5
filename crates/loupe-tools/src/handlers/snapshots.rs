use base64::Engine;
use serde_json::{json, Value};

use loupe_core::ids::{EventId, SessionId, SnapshotId};
use loupe_store::snapshots::SnapshotRow;
use loupe_store::StoreError;

use crate::context::ToolContext;
use crate::envelope::envelope;
use crate::error::ToolsError;
use crate::pagination::Page;
use crate::validate::{opt_bool, opt_i64, opt_u32, require_str};

const DEFAULT_SNAPSHOT_LIMIT: u32 = 25;
const DEFAULT_CHUNK_BYTES: usize = 64 * 1024;
const MAX_CHUNK_BYTES: usize = 256 * 1024;

/// `list_snapshots` (spec.md §4.7): newest-first page of a session's
/// recorded snapshots.
pub fn list_snapshots(ctx: &ToolContext, args: &Value) -> Result<Value, ToolsError> {
    let session_id = SessionId::from_raw(require_str(args, "sessionId")?);
    let page = Page::new(opt_u32(args, "limit"), opt_u32(args, "offset"), DEFAULT_SNAPSHOT_LIMIT);

    let rows = ctx.store.snapshots().list_for_session(&session_id, page.fetch_limit(), page.offset)?;
    let (rows, truncated) = page.truncate(rows);
    let snapshots: Vec<Value> = rows.iter().map(|r| serde_json::to_value(r).expect("SnapshotRow always serializes")).collect();

    Ok(envelope(Some(session_id.as_str()), page.limit, truncated, json!({ "snapshots": snapshots })))
}

/// `get_snapshot_for_event` (spec.md §4.7): prefer the snapshot whose
/// `trigger_event_id` links directly to this event; fall back to the
/// nearest-by-timestamp snapshot in the session within `maxDeltaMs`.
pub fn get_snapshot_for_event(ctx: &ToolContext, args: &Value) -> Result<Value, ToolsError> {
    let session_id = SessionId::from_raw(require_str(args, "sessionId")?);
    let event_id = EventId::from_raw(require_str(args, "eventId")?);
    let max_delta_ms = opt_i64(args, "maxDeltaMs").unwrap_or(10_000).max(0);

    let event = ctx.store.events().get(&event_id)?;

    const SCAN_LIMIT: u32 = 1_000;
    let candidates = ctx.store.snapshots().list_for_session(&session_id, SCAN_LIMIT, 0)?;

    let exact = candidates.iter().find(|s| s.trigger_event_id.as_ref() == Some(&event_id));
    let nearest = exact.or_else(|| {
        candidates
            .iter()
            .filter(|s| (s.timestamp - event.timestamp).abs() <= max_delta_ms)
            .min_by_key(|s| (s.timestamp - event.timestamp).abs())
    });

    match nearest {
        Some(row) => Ok(envelope(
            Some(session_id.as_str()),
            1,
            false,
            json!({
                "snapshot": row,
                "matchedBy": if exact.is_some() { "trigger_event_id" } else { "nearest_timestamp" },
            }),
        )),
        None => Err(ToolsError::Store(StoreError::NotFound(format!(
            "no snapshot within {max_delta_ms}ms of event {event_id}"
        )))),
    }
}

/// `get_snapshot_asset` (spec.md §4.7): a bounded chunk of a snapshot's PNG
/// bytes, as a raw byte array or base64, so large assets never blow a
/// single tool response.
pub fn get_snapshot_asset(ctx: &ToolContext, args: &Value) -> Result<Value, ToolsError> {
    let snapshot_id = SnapshotId::from_raw(require_str(args, "snapshotId")?);
    let offset = opt_u32(args, "offset").unwrap_or(0) as usize;
    let chunk_bytes = opt_u32(args, "chunkBytes")
        .map(|n| n as usize)
        .unwrap_or(DEFAULT_CHUNK_BYTES)
        .clamp(1, MAX_CHUNK_BYTES);
    let as_base64 = opt_bool(args, "base64").unwrap_or(true);

    let snapshots = ctx.store.snapshots();
    let row: SnapshotRow = snapshots.get(&snapshot_id)?;
    let bytes = snapshots.read_png(&row)?;

    let end = (offset + chunk_bytes).min(bytes.len());
    let chunk = if offset < bytes.len() { &bytes[offset..end] } else { &[] };
    let has_more = end < bytes.len();

    let data = if as_base64 {
        json!(base64::engine::general_purpose::STANDARD.encode(chunk))
    } else {
        json!(chunk)
    };

    Ok(envelope(
        Some(row.session_id.as_str()),
        1,
        false,
        json!({
            "snapshotId": snapshot_id.as_str(),
            "mime": row.png_mime,
            "totalBytes": bytes.len(),
            "offset": offset,
            "chunkBytes": chunk.len(),
            "hasMore": has_more,
            "data": data,
            "encoding": if as_base64 { "base64" } else { "raw" },
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use loupe_core::kinds::{SnapshotMode, SnapshotTrigger, StyleMode};
    use loupe_ingest::IngestContext;
    use loupe_redact::Redactor;
    use loupe_session::SessionRegistry;
    use loupe_store::sessions::NewSession;
    use loupe_store::snapshots::NewSnapshot;
    use loupe_store::Store;
    use std::sync::Arc;

    const TINY_PNG_B64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNk+A8AAQUBAScY42YAAAAASUVORK5CYII=";

    fn ctx_with_session() -> (ToolContext, SessionId) {
        let store = Store::in_memory().unwrap();
        let sid = store
            .sessions()
            .create(
                None,
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
                1000,
            )
            .unwrap()
            .id;
        let ingest = IngestContext {
            store,
            redactor: Redactor::new(false),
            sessions: Arc::new(SessionRegistry::new()),
            connections: Arc::new(loupe_ingest::ConnectionRegistry::new()),
        };
        (ToolContext::new(ingest), sid)
    }

    #[test]
    fn asset_chunk_roundtrips_base64() {
        let (ctx, sid) = ctx_with_session();
        let snapshots = ctx.store.snapshots();
        let id = ctx
            .store
            .db()
            .with_conn(|conn| {
                snapshots.insert_on_conn(
                    conn,
                    &sid,
                    NewSnapshot {
                        trigger_event_id: None,
                        timestamp: 10,
                        trigger_kind: SnapshotTrigger::Manual,
                        selector: None,
                        url: Some("https://a.test".into()),
                        mode: SnapshotMode::Png,
                        style_mode: StyleMode::ComputedLite,
                        dom_json: None,
                        styles_json: None,
                        dom_truncated: false,
                        styles_truncated: false,
                        png_data_url: Some(format!("data:image/png;base64,{TINY_PNG_B64}")),
                    },
                )
            })
            .unwrap();

        let result = get_snapshot_asset(&ctx, &json!({"snapshotId": id.as_str()})).unwrap();
        assert_eq!(result["hasMore"], false);
        assert_eq!(result["encoding"], "base64");
    }

    #[test]
    fn for_event_falls_back_to_nearest_timestamp() {
        let (ctx, sid) = ctx_with_session();
        ctx.store
            .insert_event_batch(&sid, vec![loupe_store::store::InboundEvent {
                id: None,
                timestamp: 100,
                wire_event_type: "error".into(),
                tab_id: None,
                payload: json!({"message": "boom", "stack": "x"}),
            }])
            .unwrap();
        let event_id = ctx.store.events().list(&Default::default(), 10, 0).unwrap()[0].id.clone();

        let snapshots = ctx.store.snapshots();
        ctx.store
            .db()
            .with_conn(|conn| {
                snapshots.insert_on_conn(
                    conn,
                    &sid,
                    NewSnapshot {
                        trigger_event_id: None,
                        timestamp: 150,
                        trigger_kind: SnapshotTrigger::Error,
                        selector: None,
                        url: None,
                        mode: SnapshotMode::Dom,
                        style_mode: StyleMode::ComputedLite,
                        dom_json: Some(json!({"tag": "html"})),
                        styles_json: None,
                        dom_truncated: false,
                        styles_truncated: false,
                        png_data_url: None,
                    },
                )
            })
            .unwrap();

        let result = get_snapshot_for_event(&ctx, &json!({"sessionId": sid.as_str(), "eventId": event_id.as_str()})).unwrap();
        assert_eq!(result["matchedBy"], "nearest_timestamp");
    }
}
