use serde_json::{json, Value};

use loupe_core::ids::SessionId;

use crate::context::ToolContext;
use crate::envelope::envelope;
use crate::error::{normalize_capture_result, ToolsError};
use crate::validate::{opt_bool, opt_str, require_str};

const SUBTREE_TIMEOUT_MS: u64 = 4_000;
const DOCUMENT_TIMEOUT_MS: u64 = 4_000;
const STYLES_TIMEOUT_MS: u64 = 3_000;
const METRICS_TIMEOUT_MS: u64 = 3_000;
const UI_SNAPSHOT_TIMEOUT_MS: u64 = 5_000;
const CONSOLE_LOGS_TIMEOUT_MS: u64 = 3_000;

async fn capture(
    ctx: &ToolContext,
    session_id: &SessionId,
    command: &str,
    payload: Value,
    timeout_ms: u64,
) -> Result<Value, ToolsError> {
    let result = loupe_ingest::send_capture(&ctx.ingest, session_id, command, payload, Some(timeout_ms)).await;
    normalize_capture_result(result)
}

fn session_id_arg(args: &Value) -> Result<SessionId, ToolsError> {
    Ok(SessionId::from_raw(require_str(args, "sessionId")?))
}

/// `get_dom_subtree` (spec.md §4.7).
pub async fn get_dom_subtree(ctx: &ToolContext, args: &Value) -> Result<Value, ToolsError> {
    let session_id = session_id_arg(args)?;
    let selector = require_str(args, "selector")?;
    let payload = capture(
        ctx,
        &session_id,
        "CAPTURE_DOM_SUBTREE",
        json!({ "selector": selector }),
        SUBTREE_TIMEOUT_MS,
    )
    .await?;
    Ok(envelope(Some(session_id.as_str()), 1, false, json!({ "dom": payload })))
}

/// `get_dom_document` (spec.md §4.7): on capture timeout, retries once with
/// an "outline" mode asking the extension for a lighter structural summary
/// instead of full serialized HTML.
pub async fn get_dom_document(ctx: &ToolContext, args: &Value) -> Result<Value, ToolsError> {
    let session_id = session_id_arg(args)?;
    match capture(ctx, &session_id, "CAPTURE_DOM_DOCUMENT", json!({ "mode": "full" }), DOCUMENT_TIMEOUT_MS).await {
        Err(ToolsError::Ingest(loupe_ingest::IngestError::CaptureTimeout(_))) => {
            let payload =
                capture(ctx, &session_id, "CAPTURE_DOM_DOCUMENT", json!({ "mode": "outline" }), DOCUMENT_TIMEOUT_MS).await?;
            Ok(envelope(Some(session_id.as_str()), 1, false, json!({ "dom": payload, "fallback": "outline" })))
        }
        Err(e) => Err(e),
        Ok(payload) => Ok(envelope(Some(session_id.as_str()), 1, false, json!({ "dom": payload }))),
    }
}

/// `get_computed_styles` (spec.md §4.7).
pub async fn get_computed_styles(ctx: &ToolContext, args: &Value) -> Result<Value, ToolsError> {
    let session_id = session_id_arg(args)?;
    let selector = require_str(args, "selector")?;
    let style_mode = downgrade_style_mode(opt_str(args, "styleMode"), opt_bool(args, "explicitStyleMode").unwrap_or(false));
    let payload = capture(
        ctx,
        &session_id,
        "CAPTURE_COMPUTED_STYLES",
        json!({ "selector": selector, "styleMode": style_mode }),
        STYLES_TIMEOUT_MS,
    )
    .await?;
    Ok(envelope(Some(session_id.as_str()), 1, false, json!({ "styles": payload, "styleMode": style_mode })))
}

/// `get_layout_metrics` (spec.md §4.7).
pub async fn get_layout_metrics(ctx: &ToolContext, args: &Value) -> Result<Value, ToolsError> {
    let session_id = session_id_arg(args)?;
    let selector = opt_str(args, "selector");
    let payload = capture(
        ctx,
        &session_id,
        "CAPTURE_LAYOUT_METRICS",
        json!({ "selector": selector }),
        METRICS_TIMEOUT_MS,
    )
    .await?;
    Ok(envelope(Some(session_id.as_str()), 1, false, json!({ "metrics": payload })))
}

/// `computed-full` requires an explicit opt-in; otherwise every request
/// silently downgrades to `computed-lite` (spec.md §4.7).
fn downgrade_style_mode(requested: Option<&str>, explicit: bool) -> &'static str {
    match requested {
        Some("computed-full") if explicit => "computed-full",
        _ => "computed-lite",
    }
}

/// `capture_ui_snapshot` (spec.md §4.7): gated by the session's safe-mode
/// flag, which stands in for "the session's configured privacy policy" —
/// safe mode permits only user-initiated (`manual`) captures, since
/// automatic triggers (error, navigation) can fire without the user
/// choosing to share a screenshot at that instant.
pub async fn capture_ui_snapshot(ctx: &ToolContext, args: &Value) -> Result<Value, ToolsError> {
    let session_id = session_id_arg(args)?;
    let trigger = opt_str(args, "trigger").unwrap_or("manual");
    let style_mode = downgrade_style_mode(opt_str(args, "styleMode"), opt_bool(args, "explicitStyleMode").unwrap_or(false));

    let session = ctx.store.sessions().get(&session_id)?;
    if session.safe_mode && trigger != "manual" {
        return Err(ToolsError::InvalidInput(
            "capture_ui_snapshot: safe mode permits manual-trigger captures only".into(),
        ));
    }

    let payload = capture(
        ctx,
        &session_id,
        "CAPTURE_UI_SNAPSHOT",
        json!({ "trigger": trigger, "styleMode": style_mode }),
        UI_SNAPSHOT_TIMEOUT_MS,
    )
    .await?;
    Ok(envelope(Some(session_id.as_str()), 1, false, json!({ "snapshot": payload, "styleMode": style_mode })))
}

/// `get_live_console_logs` (spec.md §4.7): round-trips to the extension's
/// live ring; filter/paging deliberately stay unapplied here so the agent
/// performs them.
pub async fn get_live_console_logs(ctx: &ToolContext, args: &Value) -> Result<Value, ToolsError> {
    let session_id = session_id_arg(args)?;
    let payload = capture(ctx, &session_id, "CAPTURE_GET_LIVE_CONSOLE_LOGS", args.clone(), CONSOLE_LOGS_TIMEOUT_MS).await?;
    Ok(envelope(Some(session_id.as_str()), 1, false, json!({ "logs": payload })))
}
