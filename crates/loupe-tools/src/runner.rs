use serde_json::Value;

use crate::context::ToolContext;
use crate::error::ToolsError;
use crate::handlers::{correlation, events, fingerprints, live, network, sessions, snapshots};

/// Dispatches one `tools/call` by name (spec.md §4.7). V1 tools resolve
/// synchronously against the store; V2 tools round-trip to the browser via
/// the capture pipeline and so are awaited here.
pub async fn call_tool(ctx: &ToolContext, name: &str, args: Value) -> Result<Value, ToolsError> {
    match name {
        "list_sessions" => sessions::list_sessions(ctx, &args),
        "get_session_summary" => sessions::get_session_summary(ctx, &args),
        "get_recent_events" => events::get_recent_events(ctx, &args),
        "get_navigation_history" => events::get_navigation_history(ctx, &args),
        "get_console_events" => events::get_console_events(ctx, &args),
        "get_element_refs" => events::get_element_refs(ctx, &args),
        "get_error_fingerprints" => fingerprints::get_error_fingerprints(ctx, &args),
        "get_network_failures" => network::get_network_failures(ctx, &args),
        "explain_last_failure" => correlation::explain_last_failure(ctx, &args),
        "get_event_correlation" => correlation::get_event_correlation(ctx, &args),
        "list_snapshots" => snapshots::list_snapshots(ctx, &args),
        "get_snapshot_for_event" => snapshots::get_snapshot_for_event(ctx, &args),
        "get_snapshot_asset" => snapshots::get_snapshot_asset(ctx, &args),

        "get_dom_subtree" => live::get_dom_subtree(ctx, &args).await,
        "get_dom_document" => live::get_dom_document(ctx, &args).await,
        "get_computed_styles" => live::get_computed_styles(ctx, &args).await,
        "get_layout_metrics" => live::get_layout_metrics(ctx, &args).await,
        "capture_ui_snapshot" => live::capture_ui_snapshot(ctx, &args).await,
        "get_live_console_logs" => live::get_live_console_logs(ctx, &args).await,

        other => Err(ToolsError::UnknownTool(other.to_string())),
    }
}
