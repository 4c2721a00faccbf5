use serde_json::{json, Value};

/// Wraps a tool-specific result in the universal response envelope (spec.md
/// §4.7): `{ sessionId?, limitsApplied: { maxResults, truncated },
/// redactionSummary?, ...toolSpecific }`. `extra` must serialize to a JSON
/// object; its keys are merged in verbatim.
pub fn envelope(session_id: Option<&str>, max_results: u32, truncated: bool, extra: Value) -> Value {
    let mut body = json!({
        "limitsApplied": { "maxResults": max_results, "truncated": truncated },
    });
    if let Some(sid) = session_id {
        body["sessionId"] = json!(sid);
    }
    let Value::Object(extra_map) = extra else {
        return body;
    };
    let Value::Object(body_map) = &mut body else {
        unreachable!()
    };
    body_map.extend(extra_map);
    body
}
