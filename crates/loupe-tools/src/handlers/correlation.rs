use serde_json::{json, Value};

use loupe_core::ids::{EventId, SessionId};
use loupe_core::kinds::EventKind;
use loupe_store::events::{EventFilter, EventRow};
use loupe_store::network::NetworkRecord;

use crate::context::ToolContext;
use crate::envelope::envelope;
use crate::error::ToolsError;
use crate::validate::{opt_i64, opt_u32, require_str};

const DEFAULT_LOOKBACK_SECONDS: i64 = 30;
const MAX_LOOKBACK_SECONDS: i64 = 600;
const NETWORK_ROOT_CAUSE_WINDOW_MS: i64 = 5_000;
const UI_TRIGGER_WINDOW_MS: i64 = 10_000;

const DEFAULT_WINDOW_SECONDS: i64 = 5;
const MAX_WINDOW_SECONDS: i64 = 60;
const CORRELATION_TOP_N: usize = 50;

/// Anything that can sit on a correlation timeline: a stored event or a
/// failing network record, normalized to a timestamp and a coarse kind.
struct TimelinePoint {
    ts: i64,
    kind: EventKind,
    value: Value,
}

fn event_point(row: &EventRow) -> TimelinePoint {
    TimelinePoint { ts: row.timestamp, kind: row.kind, value: json!({ "type": "event", "event": row }) }
}

fn network_point(r: &NetworkRecord) -> TimelinePoint {
    TimelinePoint {
        ts: r.start_timestamp,
        kind: EventKind::Network,
        value: json!({ "type": "network_failure", "record": r }),
    }
}

/// A generously-scanned window of this session's events and failing network
/// rows; neither store supports a combined time-range query so both are
/// fetched and filtered in Rust, same pattern as the summary counters.
fn window_points(
    ctx: &ToolContext,
    session_id: &SessionId,
    since_ts: i64,
    until_ts: i64,
) -> Result<Vec<TimelinePoint>, ToolsError> {
    const SCAN_LIMIT: u32 = 5_000;

    let events = ctx.store.events().list(
        &EventFilter {
            session_id: Some(session_id.clone()),
            since_ts: Some(since_ts),
            until_ts: Some(until_ts),
            ..Default::default()
        },
        SCAN_LIMIT,
        0,
    )?;

    let failures = ctx
        .store
        .network()
        .list_failures(session_id, SCAN_LIMIT, 0)?
        .into_iter()
        .filter(|r| r.start_timestamp >= since_ts && r.start_timestamp <= until_ts);

    let mut points: Vec<TimelinePoint> = events.iter().map(event_point).collect();
    points.extend(failures.map(|r| network_point(&r)));
    points.sort_by_key(|p| p.ts);
    Ok(points)
}

fn is_error_or_network(kind: EventKind) -> bool {
    matches!(kind, EventKind::Error | EventKind::Network)
}

/// `explain_last_failure` (spec.md §4.7): anchor on whichever of the latest
/// error event or latest network failure is more recent, then classify a
/// root cause by proximity within the anchor's lookback window.
pub fn explain_last_failure(ctx: &ToolContext, args: &Value) -> Result<Value, ToolsError> {
    let session_id = SessionId::from_raw(require_str(args, "sessionId")?);
    let lookback_seconds = opt_i64(args, "lookbackSeconds")
        .unwrap_or(DEFAULT_LOOKBACK_SECONDS)
        .clamp(1, MAX_LOOKBACK_SECONDS);
    let lookback_ms = lookback_seconds * 1000;

    let last_error = ctx
        .store
        .events()
        .list(
            &EventFilter { session_id: Some(session_id.clone()), kinds: Some(vec![EventKind::Error]), ..Default::default() },
            1,
            0,
        )?
        .into_iter()
        .next();
    let last_network_failure = ctx.store.network().list_failures(&session_id, 1, 0)?.into_iter().next();

    let anchor_ts = match (&last_error, &last_network_failure) {
        (Some(e), Some(n)) => e.timestamp.max(n.start_timestamp),
        (Some(e), None) => e.timestamp,
        (None, Some(n)) => n.start_timestamp,
        (None, None) => {
            return Ok(envelope(
                Some(session_id.as_str()),
                1,
                false,
                json!({ "rootCause": { "type": "unclassified" }, "timeline": [] }),
            ));
        }
    };

    let points = window_points(ctx, &session_id, anchor_ts - lookback_ms, anchor_ts + lookback_ms)?;

    let network_root_cause = points.iter().find(|p| {
        p.kind == EventKind::Network
            && p.ts <= anchor_ts
            && anchor_ts - p.ts <= NETWORK_ROOT_CAUSE_WINDOW_MS
            && p.value.get("type").and_then(Value::as_str) == Some("network_failure")
    });
    let ui_trigger = points.iter().find(|p| {
        p.kind == EventKind::Ui && p.ts <= anchor_ts && anchor_ts - p.ts <= UI_TRIGGER_WINDOW_MS
    });

    let root_cause = if let Some(p) = network_root_cause {
        json!({ "type": "network", "detail": p.value })
    } else if let Some(p) = ui_trigger {
        json!({ "type": "ui", "detail": p.value })
    } else {
        json!({ "type": "unclassified" })
    };

    let timeline: Vec<&Value> = points.iter().map(|p| &p.value).collect();
    Ok(envelope(Some(session_id.as_str()), 1, false, json!({ "rootCause": root_cause, "timeline": timeline, "anchorTs": anchor_ts })))
}

/// Semantic weight between an anchor kind and a candidate kind (spec.md
/// §4.7). Asymmetric: an anchor UI action weighs its downstream
/// error/network candidates higher than the reverse direction, reflecting
/// that a click causing a failure is the more common story to surface.
fn semantic_weight(anchor: EventKind, candidate: EventKind) -> f64 {
    if anchor == EventKind::Ui && is_error_or_network(candidate) {
        0.85
    } else if is_error_or_network(anchor) && candidate == EventKind::Ui {
        0.75
    } else if is_error_or_network(anchor) && is_error_or_network(candidate) {
        0.9
    } else if anchor == EventKind::Nav || candidate == EventKind::Nav {
        0.6
    } else {
        0.45
    }
}

fn relationship_label(anchor: EventKind, candidate: EventKind, delta_ms: i64) -> String {
    let direction = if delta_ms < 0 { "before" } else { "after" };
    format!("{}_{}_{}", candidate.as_str(), direction, anchor.as_str())
}

/// `get_event_correlation` (spec.md §4.7): rank events and failing network
/// rows within `windowSeconds` of an anchor event by
/// `0.7 * semantic weight + 0.3 * temporal decay`, where decay falls off
/// linearly to 0 at the edge of the window.
pub fn get_event_correlation(ctx: &ToolContext, args: &Value) -> Result<Value, ToolsError> {
    let event_id = EventId::from_raw(require_str(args, "eventId")?);
    let window_seconds = opt_u32(args, "windowSeconds")
        .map(|s| s as i64)
        .unwrap_or(DEFAULT_WINDOW_SECONDS)
        .clamp(1, MAX_WINDOW_SECONDS);
    let window_ms = window_seconds * 1000;

    let anchor = ctx.store.events().get(&event_id)?;
    let session_id = anchor.session_id.clone();

    let points = window_points(ctx, &session_id, anchor.timestamp - window_ms, anchor.timestamp + window_ms)?;

    let mut scored: Vec<Value> = points
        .into_iter()
        .filter(|p| p.value.get("event").and_then(|e| e.get("id")).and_then(Value::as_str) != Some(event_id.as_str()))
        .map(|p| {
            let delta_ms = p.ts - anchor.timestamp;
            let weight = semantic_weight(anchor.kind, p.kind);
            let decay = (1.0 - (delta_ms.unsigned_abs() as f64 / window_ms as f64)).max(0.0);
            let score = 0.7 * weight + 0.3 * decay;
            json!({
                "point": p.value,
                "deltaMs": delta_ms,
                "correlationScore": score,
                "relationship": relationship_label(anchor.kind, p.kind, delta_ms),
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        let sa = a["correlationScore"].as_f64().unwrap_or(0.0);
        let sb = b["correlationScore"].as_f64().unwrap_or(0.0);
        sb.partial_cmp(&sa)
            .unwrap()
            .then_with(|| {
                let da = a["deltaMs"].as_i64().unwrap_or(0).abs();
                let db = b["deltaMs"].as_i64().unwrap_or(0).abs();
                da.cmp(&db)
            })
    });
    let truncated = scored.len() > CORRELATION_TOP_N;
    scored.truncate(CORRELATION_TOP_N);

    Ok(envelope(
        Some(session_id.as_str()),
        CORRELATION_TOP_N as u32,
        truncated,
        json!({ "anchorEventId": event_id.as_str(), "correlated": scored }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use loupe_ingest::IngestContext;
    use loupe_redact::Redactor;
    use loupe_session::SessionRegistry;
    use loupe_store::sessions::NewSession;
    use loupe_store::store::InboundEvent;
    use loupe_store::Store;
    use std::sync::Arc;

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
    fn explain_last_failure_is_unclassified_with_no_history() {
        let (ctx, sid) = ctx_with_session();
        let result = explain_last_failure(&ctx, &json!({"sessionId": sid.as_str()})).unwrap();
        assert_eq!(result["rootCause"]["type"], "unclassified");
    }

    #[test]
    fn explain_last_failure_picks_ui_trigger_within_window() {
        let (ctx, sid) = ctx_with_session();
        ctx.store
            .insert_event_batch(
                &sid,
                vec![
                    InboundEvent { id: None, timestamp: 1_000, wire_event_type: "click".into(), tab_id: None, payload: json!({"selector": "#go"}) },
                    InboundEvent { id: None, timestamp: 5_000, wire_event_type: "error".into(), tab_id: None, payload: json!({"message": "boom", "stack": "at x:1"}) },
                ],
            )
            .unwrap();

        let result = explain_last_failure(&ctx, &json!({"sessionId": sid.as_str()})).unwrap();
        assert_eq!(result["rootCause"]["type"], "ui");
    }

    #[test]
    fn correlation_ranks_candidates_by_score() {
        let (ctx, sid) = ctx_with_session();
        ctx.store
            .insert_event_batch(
                &sid,
                vec![
                    InboundEvent { id: None, timestamp: 1_000, wire_event_type: "error".into(), tab_id: None, payload: json!({"message": "boom", "stack": "at x:1"}) },
                    InboundEvent { id: None, timestamp: 1_500, wire_event_type: "error".into(), tab_id: None, payload: json!({"message": "boom2", "stack": "at y:1"}) },
                    InboundEvent { id: None, timestamp: 4_000, wire_event_type: "console".into(), tab_id: None, payload: json!({"level": "log", "message": "unrelated"}) },
                ],
            )
            .unwrap();

        let anchor = ctx
            .store
            .events()
            .list(&EventFilter { session_id: Some(sid.clone()), since_ts: Some(1_000), until_ts: Some(1_000), ..Default::default() }, 10, 0)
            .unwrap()
            .remove(0);

        let result = get_event_correlation(&ctx, &json!({"eventId": anchor.id.as_str(), "windowSeconds": 5})).unwrap();
        let correlated = result["correlated"].as_array().unwrap();
        assert_eq!(correlated.len(), 2);
        assert!(correlated[0]["correlationScore"].as_f64().unwrap() >= correlated[1]["correlationScore"].as_f64().unwrap());
    }
}
