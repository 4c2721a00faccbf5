use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound frames (agent → server), one JSON object per message,
/// discriminated by `type` (spec.md §6). Validated once at the boundary so
/// downstream code only ever sees typed variants (spec.md §9, "Dynamically
/// typed messages").
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    Ping,
    Pong,
    SessionStart(SessionStartFrame),
    SessionEnd(SessionEndFrame),
    Event(EventFrame),
    EventBatch(EventBatchFrame),
    CaptureResult(CaptureResultFrame),
}

#[derive(Clone, Debug, Deserialize)]
pub struct Viewport {
    pub width: i64,
    pub height: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SessionStartFrame {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub url: String,
    #[serde(rename = "tabId")]
    pub tab_id: Option<i64>,
    #[serde(rename = "windowId")]
    pub window_id: Option<i64>,
    #[serde(rename = "userAgent")]
    pub user_agent: Option<String>,
    pub viewport: Option<Viewport>,
    pub dpr: Option<f64>,
    #[serde(rename = "safeMode", default)]
    pub safe_mode: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SessionEndFrame {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EventFrame {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "eventType")]
    pub event_type: String,
    pub data: Value,
    pub timestamp: i64,
    #[serde(rename = "tabId")]
    pub tab_id: Option<i64>,
    pub origin: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EventBatchFrame {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub events: Vec<BatchedEvent>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BatchedEvent {
    #[serde(rename = "eventType")]
    pub event_type: String,
    pub data: Value,
    pub timestamp: i64,
    #[serde(rename = "tabId")]
    pub tab_id: Option<i64>,
    pub origin: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CaptureResultFrame {
    #[serde(rename = "commandId")]
    pub command_id: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub ok: bool,
    pub payload: Option<Value>,
    pub truncated: Option<bool>,
    pub error: Option<String>,
}

/// Outbound frames (server → agent); spec.md §6.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Pong,
    Error { error: String, code: String },
    CaptureCommand(CaptureCommandFrame),
}

#[derive(Clone, Debug, Serialize)]
pub struct CaptureCommandFrame {
    #[serde(rename = "commandId")]
    pub command_id: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub command: String,
    pub payload: Value,
    #[serde(rename = "timeoutMs", skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Recognized outbound capture commands (spec.md §4.5).
pub const CAPTURE_COMMANDS: &[&str] = &[
    "CAPTURE_DOM_SUBTREE",
    "CAPTURE_DOM_DOCUMENT",
    "CAPTURE_COMPUTED_STYLES",
    "CAPTURE_LAYOUT_METRICS",
    "CAPTURE_UI_SNAPSHOT",
    "CAPTURE_GET_LIVE_CONSOLE_LOGS",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ping() {
        let frame: InboundFrame = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(frame, InboundFrame::Ping));
    }

    #[test]
    fn parses_session_start() {
        let json = r#"{"type":"session_start","sessionId":"sess-x","url":"https://a.test","safeMode":true}"#;
        let frame: InboundFrame = serde_json::from_str(json).unwrap();
        match frame {
            InboundFrame::SessionStart(f) => {
                assert_eq!(f.session_id, "sess-x");
                assert!(f.safe_mode);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn parses_event_batch() {
        let json = r#"{"type":"event_batch","sessionId":"sess-x","events":[
            {"eventType":"console","data":{},"timestamp":1}
        ]}"#;
        let frame: InboundFrame = serde_json::from_str(json).unwrap();
        match frame {
            InboundFrame::EventBatch(f) => assert_eq!(f.events.len(), 1),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unknown_type_fails_to_parse() {
        let result: Result<InboundFrame, _> = serde_json::from_str(r#"{"type":"bogus"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn capture_command_serializes_camel_case() {
        let frame = OutboundFrame::CaptureCommand(CaptureCommandFrame {
            command_id: "cmd-1".into(),
            session_id: "sess-1".into(),
            command: "CAPTURE_DOM_SUBTREE".into(),
            payload: serde_json::json!({}),
            timeout_ms: Some(4000),
        });
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["commandId"], "cmd-1");
        assert_eq!(json["timeoutMs"], 4000);
        assert_eq!(json["type"], "capture_command");
    }
}
