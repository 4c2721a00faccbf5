use std::collections::HashMap;

use serde_json::{json, Value};

use loupe_core::ids::SessionId;
use loupe_store::network::NetworkRecord;

use crate::context::ToolContext;
use crate::envelope::envelope;
use crate::error::ToolsError;
use crate::pagination::Page;
use crate::validate::{opt_str, opt_u32, require_str};

const DEFAULT_NETWORK_LIMIT: u32 = 50;

fn record_to_json(r: &NetworkRecord) -> Value {
    serde_json::to_value(r).expect("NetworkRecord always serializes")
}

/// `get_network_failures` (spec.md §4.7): failed/pending requests for a
/// session, optionally grouped by `errorClass`.
pub fn get_network_failures(ctx: &ToolContext, args: &Value) -> Result<Value, ToolsError> {
    let session_id = SessionId::from_raw(require_str(args, "sessionId")?);
    let page = Page::new(opt_u32(args, "limit"), opt_u32(args, "offset"), DEFAULT_NETWORK_LIMIT);

    let rows = ctx.store.network().list_failures(&session_id, page.fetch_limit(), page.offset)?;
    let (rows, truncated) = page.truncate(rows);

    let extra = match opt_str(args, "groupBy") {
        Some("errorClass") => {
            let mut groups: HashMap<String, Vec<Value>> = HashMap::new();
            for r in &rows {
                let key = r.error_class.map(|c| c.as_str().to_string()).unwrap_or_else(|| "http_status".to_string());
                groups.entry(key).or_default().push(record_to_json(r));
            }
            json!({ "groups": groups })
        }
        _ => json!({ "failures": rows.iter().map(record_to_json).collect::<Vec<_>>() }),
    };

    Ok(envelope(Some(session_id.as_str()), page.limit, truncated, extra))
}

#[cfg(test)]
mod tests {
    use super::*;
    use loupe_core::kinds::NetworkInitiator;
    use loupe_ingest::IngestContext;
    use loupe_redact::Redactor;
    use loupe_session::SessionRegistry;
    use loupe_store::network::{NetworkRepo, NewNetworkRecord};
    use loupe_store::sessions::NewSession;
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
    fn groups_failures_by_error_class() {
        let (ctx, sid) = ctx_with_session();
        ctx.store
            .db()
            .with_conn(|conn| {
                NetworkRepo::insert_on_conn(
                    conn,
                    &sid,
                    &NewNetworkRecord {
                        start_timestamp: 1,
                        duration_ms: Some(5),
                        method: "GET".into(),
                        url: "https://a.test/x".into(),
                        origin: Some("https://a.test".into()),
                        status: None,
                        initiator: NetworkInitiator::Fetch,
                        error_class: Some(loupe_core::kinds::NetworkErrorClass::Blocked),
                        estimated_size_bytes: None,
                    },
                )
                .map(|_| ())
            })
            .unwrap();

        let result = get_network_failures(&ctx, &json!({"sessionId": sid.as_str(), "groupBy": "errorClass"})).unwrap();
        assert!(result["groups"]["blocked"].as_array().unwrap().len() == 1);
    }
}
