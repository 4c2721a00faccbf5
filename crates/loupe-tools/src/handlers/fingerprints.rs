use serde_json::{json, Value};

use loupe_core::ids::SessionId;

use crate::context::ToolContext;
use crate::envelope::envelope;
use crate::error::ToolsError;
use crate::pagination::Page;
use crate::validate::{opt_u32, require_str};

const DEFAULT_FINGERPRINT_LIMIT: u32 = 25;

/// `get_error_fingerprints` (spec.md §4.7): deduplicated error groups for a
/// session, newest-seen first.
pub fn get_error_fingerprints(ctx: &ToolContext, args: &Value) -> Result<Value, ToolsError> {
    let session_id = SessionId::from_raw(require_str(args, "sessionId")?);
    let page = Page::new(opt_u32(args, "limit"), opt_u32(args, "offset"), DEFAULT_FINGERPRINT_LIMIT);

    let rows = ctx.store.fingerprints().list_for_session(&session_id, page.fetch_limit(), page.offset)?;
    let (rows, truncated) = page.truncate(rows);
    let fingerprints: Vec<Value> = rows.iter().map(|r| serde_json::to_value(r).expect("ErrorFingerprint always serializes")).collect();

    Ok(envelope(Some(session_id.as_str()), page.limit, truncated, json!({ "fingerprints": fingerprints })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use loupe_core::ids::FingerprintId;
    use loupe_ingest::IngestContext;
    use loupe_redact::Redactor;
    use loupe_session::SessionRegistry;
    use loupe_store::fingerprints::FingerprintRepo;
    use loupe_store::sessions::NewSession;
    use loupe_store::Store;
    use std::sync::Arc;

    #[test]
    fn lists_fingerprints_newest_seen_first() {
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

        let fp_old = FingerprintId::from_normalized("old", "at a.js:1");
        let fp_new = FingerprintId::from_normalized("new", "at b.js:2");
        store
            .db()
            .with_conn(|conn| {
                FingerprintRepo::upsert_on_conn(conn, &sid, &fp_old, "old", "at a.js:1", 10)?;
                FingerprintRepo::upsert_on_conn(conn, &sid, &fp_new, "new", "at b.js:2", 20)?;
                Ok(())
            })
            .unwrap();

        let ingest = IngestContext {
            store,
            redactor: Redactor::new(false),
            sessions: Arc::new(SessionRegistry::new()),
            connections: Arc::new(loupe_ingest::ConnectionRegistry::new()),
        };
        let ctx = ToolContext::new(ingest);

        let result = get_error_fingerprints(&ctx, &json!({"sessionId": sid.as_str()})).unwrap();
        let fps = result["fingerprints"].as_array().unwrap();
        assert_eq!(fps.len(), 2);
        assert_eq!(fps[0]["sample_message"], "new");
    }
}
