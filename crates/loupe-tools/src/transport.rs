use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{instrument, warn};

use loupe_core::errors::ErrorKind;

use crate::catalogue::catalogue;
use crate::context::ToolContext;
use crate::runner::call_tool;

#[derive(Deserialize)]
struct ToolRequest {
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

/// Runs the stdio JSON-RPC tool transport (spec.md §4.7, §6): one request
/// per line on stdin, one response per line on stdout. Exits when stdin
/// closes.
#[instrument(skip(ctx, stdin, stdout))]
pub async fn serve_stdio<R, W>(ctx: &ToolContext, stdin: R, mut stdout: W) -> std::io::Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(stdin).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(ctx, &line).await;
        stdout.write_all(response.to_string().as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}

async fn handle_line(ctx: &ToolContext, line: &str) -> Value {
    let request: ToolRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "malformed tool request line");
            return with_id(None, json!({ "isError": true, "content": [{"type": "text", "text": format!("invalid request: {e}")}] }));
        }
    };

    let body = match request.method.as_str() {
        "tools/list" => json!({ "tools": catalogue() }),
        "tools/call" => handle_call(ctx, &request.params).await,
        other => json!({ "isError": true, "content": [{"type": "text", "text": format!("unknown method: {other}")}] }),
    };
    with_id(request.id, body)
}

fn with_id(id: Option<Value>, mut body: Value) -> Value {
    if let (Some(id), Value::Object(map)) = (id, &mut body) {
        map.insert("id".to_string(), id);
    }
    body
}

async fn handle_call(ctx: &ToolContext, params: &Value) -> Value {
    let Some(name) = params.get("name").and_then(Value::as_str) else {
        return json!({ "isError": true, "content": [{"type": "text", "text": "tools/call requires a tool name"}] });
    };
    let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

    match call_tool(ctx, name, arguments).await {
        Ok(result) => json!({ "content": [{ "type": "text", "text": result.to_string() }] }),
        Err(e) => json!({
            "isError": true,
            "content": [{ "type": "text", "text": e.to_string() }],
            "errorKind": e.error_kind(),
        }),
    }
}
