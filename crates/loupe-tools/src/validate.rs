use serde_json::Value;

use loupe_core::origin::normalize_origin;

use crate::error::ToolsError;

/// A required field missing from a tool call's `arguments` (spec.md §4.7
/// "missing required fields → typed error").
pub fn require_str<'a>(args: &'a Value, field: &str) -> Result<&'a str, ToolsError> {
    args.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolsError::InvalidInput(format!("{field} is required")))
}

pub fn opt_str<'a>(args: &'a Value, field: &str) -> Option<&'a str> {
    args.get(field).and_then(Value::as_str)
}

pub fn opt_u32(args: &Value, field: &str) -> Option<u32> {
    args.get(field).and_then(Value::as_u64).map(|n| n as u32)
}

pub fn opt_i64(args: &Value, field: &str) -> Option<i64> {
    args.get(field).and_then(Value::as_i64)
}

pub fn opt_bool(args: &Value, field: &str) -> Option<bool> {
    args.get(field).and_then(Value::as_bool)
}

/// `tabId must be an integer` (spec.md §4.7 validation rule). Any non-null,
/// non-integer value at `tabId` is rejected rather than silently coerced.
pub fn opt_tab_id(args: &Value, field: &str) -> Result<Option<i64>, ToolsError> {
    match args.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| ToolsError::InvalidInput(format!("{field} must be an integer"))),
    }
}

/// Normalizes a `url` filter into its origin, rejecting anything that isn't
/// an absolute http(s) URL (spec.md §4.7 validation rule).
pub fn normalize_url_filter(url: &str) -> Result<String, ToolsError> {
    normalize_origin(url)
        .ok_or_else(|| ToolsError::InvalidInput("url must be a valid absolute http(s) URL".into()))
}
