pub mod protocol;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::error::MailgraphError;
use crate::graph::GraphClient;
use crate::tools;

use protocol::{JsonRpcRequest, JsonRpcResponse, INVALID_REQUEST, METHOD_NOT_FOUND};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Run the MCP server loop over stdio until stdin closes.
///
/// One line in, at most one line out. Everything written to stdout is
/// protocol; diagnostics go to stderr via tracing.
pub async fn serve(client: GraphClient) -> Result<(), MailgraphError> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let Some(response) = handle_line(&client, &line).await else {
            continue;
        };
        let serialized = serde_json::to_string(&response)
            .map_err(|e| MailgraphError::Protocol(format!("serialize response: {e}")))?;
        stdout.write_all(serialized.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}

/// Handle one raw input line. Returns `None` for notifications and lines
/// that are not JSON-RPC at all.
async fn handle_line(client: &GraphClient, line: &str) -> Option<JsonRpcResponse> {
    let request: JsonRpcRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!("Skipping unparsable input line: {e}");
            return None;
        }
    };
    let id = request.id?;
    Some(handle_request(client, id, &request.method, request.params).await)
}

async fn handle_request(
    client: &GraphClient,
    id: serde_json::Value,
    method: &str,
    params: Option<serde_json::Value>,
) -> JsonRpcResponse {
    match method {
        "initialize" => JsonRpcResponse::success(
            id,
            serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": {
                    "name": "mailgraph",
                    "version": env!("CARGO_PKG_VERSION"),
                },
                "capabilities": { "tools": {} },
            }),
        ),
        "tools/list" => JsonRpcResponse::success(
            id,
            serde_json::json!({ "tools": tools::definitions() }),
        ),
        "tools/call" => {
            let params = params.unwrap_or_else(|| serde_json::json!({}));
            let Some(name) = params.get("name").and_then(|n| n.as_str()) else {
                return JsonRpcResponse::error(
                    id,
                    INVALID_REQUEST,
                    "tools/call requires params.name",
                );
            };
            let arguments = params
                .get("arguments")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            let result = tools::dispatch(client, name, arguments).await;
            JsonRpcResponse::success(id, tool_result_envelope(result))
        }
        other => JsonRpcResponse::error(
            id,
            METHOD_NOT_FOUND,
            format!("Unknown method: {other}"),
        ),
    }
}

/// Wrap a tool outcome in MCP content blocks. Tool failures become
/// `isError` results rather than protocol errors, so they never tear down
/// the session.
fn tool_result_envelope(result: Result<serde_json::Value, MailgraphError>) -> serde_json::Value {
    match result {
        Ok(value) => serde_json::json!({
            "content": [{
                "type": "text",
                "text": serde_json::to_string_pretty(&value).unwrap_or_default(),
            }],
            "isError": false,
        }),
        Err(e) => serde_json::json!({
            "content": [{
                "type": "text",
                "text": serde_json::to_string_pretty(&e.to_json()).unwrap_or_default(),
            }],
            "isError": true,
        }),
    }
}
