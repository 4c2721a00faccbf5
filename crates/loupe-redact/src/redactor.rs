use serde_json::Value;
use tracing::trace;

use crate::patterns::{is_sensitive_key, match_credential_shape};

/// Event kinds dropped wholesale in safe mode (spec.md §4.3): the caller
/// receives `None` and must not persist the event at all.
const SAFE_MODE_DROPPED_KINDS: &[&str] = &["cookie", "storage", "local_storage", "session_storage"];

#[derive(Clone, Copy, Debug, Default)]
pub struct Redactor {
    pub safe_mode: bool,
}

impl Redactor {
    pub fn new(safe_mode: bool) -> Self {
        Self { safe_mode }
    }

    /// Applies the redaction rules to an event payload. Returns `None` when
    /// the event's wire kind is wholesale-dropped under safe mode.
    pub fn redact_event(&self, wire_event_type: &str, payload: Value) -> Option<Value> {
        if self.safe_mode && SAFE_MODE_DROPPED_KINDS.contains(&wire_event_type) {
            trace!(wire_event_type, "dropping event under safe mode");
            return None;
        }
        Some(self.redact_value(None, payload))
    }

    /// Recursively redacts a value tree (spec.md §4.3). `key` is the
    /// enclosing object key this value was found under, if any, so
    /// sensitive-key-name redaction (rule b) can apply before the
    /// credential-shape check (rule a).
    pub fn redact_value(&self, key: Option<&str>, value: Value) -> Value {
        if let Some(k) = key {
            if is_sensitive_key(k) {
                return Value::String(marker("sensitive_key"));
            }
        }

        match value {
            Value::String(s) => match match_credential_shape(&s) {
                Some(rule) => Value::String(marker(rule)),
                None => Value::String(s),
            },
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.redact_value(None, item))
                    .collect(),
            ),
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| {
                        let redacted = self.redact_value(Some(&k), v);
                        (k, redacted)
                    })
                    .collect(),
            ),
            other => other,
        }
    }
}

fn marker(rule: &str) -> String {
    format!("[REDACTED:{rule}]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn credential_shape_string_is_redacted_with_rule_marker() {
        let r = Redactor::new(false);
        let out = r.redact_value(None, json!("api_key=sk-abc123"));
        assert_eq!(out, json!("[REDACTED:key_value]"));
    }

    #[test]
    fn sensitive_key_fully_redacts_value_regardless_of_content() {
        let r = Redactor::new(false);
        let out = r.redact_value(None, json!({"cookie": "ordinary text, nothing suspicious"}));
        assert_eq!(out, json!({"cookie": "[REDACTED:sensitive_key]"}));
    }

    #[test]
    fn arrays_are_mapped_element_wise() {
        let r = Redactor::new(false);
        let out = r.redact_value(None, json!(["hello", "api_key=xyz123", 42]));
        assert_eq!(out, json!(["hello", "[REDACTED:key_value]", 42]));
    }

    #[test]
    fn scalars_pass_through() {
        let r = Redactor::new(false);
        assert_eq!(r.redact_value(None, json!(42)), json!(42));
        assert_eq!(r.redact_value(None, json!(true)), json!(true));
        assert_eq!(r.redact_value(None, json!(null)), json!(null));
    }

    #[test]
    fn redaction_is_idempotent() {
        let r = Redactor::new(false);
        let input = json!({"token": "abc", "msg": "password: hunter2"});
        let once = r.redact_value(None, input);
        let twice = r.redact_value(None, once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn safe_mode_drops_storage_events_wholesale() {
        let r = Redactor::new(true);
        assert!(r.redact_event("local_storage", json!({"k": "v"})).is_none());
        assert!(r.redact_event("cookie", json!({})).is_none());
        assert!(r.redact_event("console", json!({"msg": "hi"})).is_some());
    }

    #[test]
    fn nested_sensitive_storage_key_redacted() {
        let r = Redactor::new(false);
        let out = r.redact_value(None, json!({"localStorage": {"anything": "goes here"}}));
        assert_eq!(out, json!({"localStorage": "[REDACTED:sensitive_key]"}));
    }
}
