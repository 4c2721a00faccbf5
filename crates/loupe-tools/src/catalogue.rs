use serde::Serialize;
use serde_json::{json, Value};

/// One entry of the fixed tool catalogue registered at startup (spec.md
/// §4.7): a name, a human-readable description, and a JSON Schema for its
/// `arguments` object.
#[derive(Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

fn def(name: &'static str, description: &'static str, input_schema: Value) -> ToolDefinition {
    ToolDefinition { name, description, input_schema }
}

/// The full catalogue: V1 query tools over the durable store, then V2 live
/// tools that round-trip through `SendCapture` (spec.md §4.7).
pub fn catalogue() -> Vec<ToolDefinition> {
    vec![
        def(
            "list_sessions",
            "List recent workstation sessions, newest first.",
            json!({
                "type": "object",
                "properties": {
                    "sinceMinutes": {"type": "integer"},
                    "limit": {"type": "integer"},
                    "offset": {"type": "integer"},
                },
            }),
        ),
        def(
            "get_session_summary",
            "Summarize a session: error/warning/failure counts, time range, last URL.",
            json!({
                "type": "object",
                "properties": {"sessionId": {"type": "string"}},
                "required": ["sessionId"],
            }),
        ),
        def(
            "get_recent_events",
            "Fetch recent events for a session or a URL's origin, optionally filtered by kind.",
            json!({
                "type": "object",
                "properties": {
                    "sessionId": {"type": "string"},
                    "url": {"type": "string"},
                    "kinds": {"type": "array", "items": {"type": "string"}},
                    "sinceTs": {"type": "integer"},
                    "untilTs": {"type": "integer"},
                    "limit": {"type": "integer"},
                    "offset": {"type": "integer"},
                },
            }),
        ),
        def(
            "get_navigation_history",
            "Fetch nav events for a session or a URL's origin.",
            json!({
                "type": "object",
                "properties": {
                    "sessionId": {"type": "string"},
                    "url": {"type": "string"},
                    "limit": {"type": "integer"},
                    "offset": {"type": "integer"},
                },
            }),
        ),
        def(
            "get_console_events",
            "Fetch console events for a session or a URL's origin, optionally filtered by level.",
            json!({
                "type": "object",
                "properties": {
                    "sessionId": {"type": "string"},
                    "url": {"type": "string"},
                    "level": {"type": "string"},
                    "limit": {"type": "integer"},
                    "offset": {"type": "integer"},
                },
            }),
        ),
        def(
            "get_error_fingerprints",
            "List deduplicated error fingerprints, most frequent and most recent first.",
            json!({
                "type": "object",
                "properties": {
                    "sessionId": {"type": "string"},
                    "sinceMinutes": {"type": "integer"},
                    "limit": {"type": "integer"},
                    "offset": {"type": "integer"},
                },
            }),
        ),
        def(
            "get_network_failures",
            "List failing network requests (non-2xx/3xx status or a recorded error class).",
            json!({
                "type": "object",
                "properties": {
                    "sessionId": {"type": "string"},
                    "url": {"type": "string"},
                    "errorType": {"type": "string"},
                    "groupBy": {"type": "string", "enum": ["url", "domain", "errorType"]},
                    "limit": {"type": "integer"},
                    "offset": {"type": "integer"},
                },
            }),
        ),
        def(
            "get_element_refs",
            "Resolve element references recorded against a CSS selector within a session.",
            json!({
                "type": "object",
                "properties": {
                    "sessionId": {"type": "string"},
                    "selector": {"type": "string"},
                },
                "required": ["sessionId", "selector"],
            }),
        ),
        def(
            "explain_last_failure",
            "Explain the most recent error or network failure using a proximity heuristic over the surrounding timeline.",
            json!({
                "type": "object",
                "properties": {
                    "sessionId": {"type": "string"},
                    "lookbackSeconds": {"type": "integer"},
                },
                "required": ["sessionId"],
            }),
        ),
        def(
            "get_event_correlation",
            "Rank events and failing network requests near an anchor event by correlation score.",
            json!({
                "type": "object",
                "properties": {
                    "eventId": {"type": "string"},
                    "windowSeconds": {"type": "integer"},
                },
                "required": ["eventId"],
            }),
        ),
        def(
            "list_snapshots",
            "List DOM/style/screenshot snapshots captured for a session.",
            json!({
                "type": "object",
                "properties": {
                    "sessionId": {"type": "string"},
                    "limit": {"type": "integer"},
                    "offset": {"type": "integer"},
                },
                "required": ["sessionId"],
            }),
        ),
        def(
            "get_snapshot_for_event",
            "Find the snapshot linked to an event, falling back to the nearest one in time.",
            json!({
                "type": "object",
                "properties": {
                    "eventId": {"type": "string"},
                    "maxDeltaMs": {"type": "integer"},
                },
                "required": ["eventId"],
            }),
        ),
        def(
            "get_snapshot_asset",
            "Fetch a chunk of a snapshot's PNG asset.",
            json!({
                "type": "object",
                "properties": {
                    "snapshotId": {"type": "string"},
                    "offset": {"type": "integer"},
                    "chunkBytes": {"type": "integer"},
                },
                "required": ["snapshotId"],
            }),
        ),
        def(
            "get_dom_subtree",
            "Live-capture the DOM subtree rooted at a selector from the connected extension.",
            json!({
                "type": "object",
                "properties": {
                    "sessionId": {"type": "string"},
                    "selector": {"type": "string"},
                    "tabId": {"type": "integer"},
                    "timeoutMs": {"type": "integer"},
                },
                "required": ["sessionId", "selector"],
            }),
        ),
        def(
            "get_dom_document",
            "Live-capture the full document, falling back to a structural outline on timeout.",
            json!({
                "type": "object",
                "properties": {
                    "sessionId": {"type": "string"},
                    "tabId": {"type": "integer"},
                    "timeoutMs": {"type": "integer"},
                },
                "required": ["sessionId"],
            }),
        ),
        def(
            "get_computed_styles",
            "Live-capture computed styles for a selector.",
            json!({
                "type": "object",
                "properties": {
                    "sessionId": {"type": "string"},
                    "selector": {"type": "string"},
                    "tabId": {"type": "integer"},
                    "timeoutMs": {"type": "integer"},
                },
                "required": ["sessionId", "selector"],
            }),
        ),
        def(
            "get_layout_metrics",
            "Live-capture layout metrics (bounding boxes, scroll offsets) for a selector.",
            json!({
                "type": "object",
                "properties": {
                    "sessionId": {"type": "string"},
                    "selector": {"type": "string"},
                    "tabId": {"type": "integer"},
                    "timeoutMs": {"type": "integer"},
                },
                "required": ["sessionId", "selector"],
            }),
        ),
        def(
            "capture_ui_snapshot",
            "Live-capture and persist a DOM/style/screenshot snapshot, subject to the session's privacy policy.",
            json!({
                "type": "object",
                "properties": {
                    "sessionId": {"type": "string"},
                    "selector": {"type": "string"},
                    "mode": {"type": "string", "enum": ["dom", "png", "both"]},
                    "styleMode": {"type": "string", "enum": ["computed-lite", "computed-full"]},
                    "explicitStyleMode": {"type": "boolean"},
                    "tabId": {"type": "integer"},
                    "timeoutMs": {"type": "integer"},
                },
                "required": ["sessionId"],
            }),
        ),
        def(
            "get_live_console_logs",
            "Fetch console/runtime-error logs from the session's live in-memory ring.",
            json!({
                "type": "object",
                "properties": {
                    "sessionId": {"type": "string"},
                    "tabId": {"type": "integer"},
                    "levels": {"type": "array", "items": {"type": "string"}},
                    "contains": {"type": "string"},
                    "sinceTs": {"type": "integer"},
                    "excludeRuntimeErrors": {"type": "boolean"},
                    "limit": {"type": "integer"},
                    "timeoutMs": {"type": "integer"},
                },
                "required": ["sessionId"],
            }),
        ),
    ]
}
