//! JSON-RPC 2.0 protocol implementation for the annotation tool surface.
//!
//! The server speaks the MCP tool-calling dialect over newline-delimited
//! stdio. Each annotation action is a tool; its result carries the rendered
//! session view.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use super::{handle_tool_call, SharedState};

#[cfg(test)]
#[path = "mcp_tests.rs"]
mod mcp_tests;

/// Protocol revision announced in the handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;

/// One line read from the client. A missing `id` marks a notification.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// One line written back; exactly one of `result` and `error` is set.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// A tool as advertised by `tools/list`.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

/// Tool output is a single text block; failures set `isError` instead of
/// producing a JSON-RPC error, so the client sees the message.
fn tool_result(text: String, failed: bool) -> Value {
    let mut result = json!({ "content": [{ "type": "text", "text": text }] });
    if failed {
        result["isError"] = Value::Bool(true);
    }
    result
}

/// Annotation server speaking JSON-RPC over a line-oriented stream.
pub struct McpServer {
    state: SharedState,
}

impl McpServer {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Serve stdin/stdout until the client closes stdin.
    pub async fn run(&self) -> std::io::Result<()> {
        info!("Annotation server listening on stdio");
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Answer each request line from `reader` on `writer` until EOF.
    ///
    /// Blank lines and notifications produce no output.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();

        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                break;
            }

            let message = line.trim();
            if message.is_empty() {
                continue;
            }
            debug!(request = %message, "Request line");

            let reply = match serde_json::from_str::<JsonRpcRequest>(message) {
                Ok(request) => self.dispatch(request).await,
                Err(e) => {
                    warn!(error = %e, "Unparseable request line");
                    Some(JsonRpcResponse::error(
                        None,
                        PARSE_ERROR,
                        format!("Parse error: {}", e),
                    ))
                }
            };

            if let Some(reply) = reply {
                let mut encoded = serde_json::to_vec(&reply)?;
                encoded.push(b'\n');
                writer.write_all(&encoded).await?;
                writer.flush().await?;
            }
        }

        info!("Client closed the stream");
        Ok(())
    }

    async fn dispatch(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id;
        match request.method.as_str() {
            "initialize" => Some(JsonRpcResponse::success(id, initialize_result())),
            "tools/list" => Some(JsonRpcResponse::success(id, json!({ "tools": all_tools() }))),
            "tools/call" => Some(self.call_tool(id, request.params).await),
            "ping" => Some(JsonRpcResponse::success(id, json!({}))),
            method if id.is_none() => {
                debug!(method = %method, "Notification");
                None
            }
            method => {
                warn!(method = %method, "Unsupported method");
                Some(JsonRpcResponse::error(
                    id,
                    METHOD_NOT_FOUND,
                    format!("Method not found: {}", method),
                ))
            }
        }
    }

    async fn call_tool(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match params.map(serde_json::from_value::<ToolCallParams>) {
            Some(Ok(params)) => params,
            Some(Err(e)) => {
                return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Invalid params: {}", e))
            }
            None => return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing params"),
        };

        info!(tool = %params.name, "Tool call");
        match handle_tool_call(&self.state, &params.name, params.arguments).await {
            Ok(body) => match serde_json::to_string_pretty(&body) {
                Ok(text) => JsonRpcResponse::success(id, tool_result(text, false)),
                Err(e) => {
                    error!(error = %e, "Tool result did not encode");
                    JsonRpcResponse::error(id, INTERNAL_ERROR, format!("Internal error: {}", e))
                }
            },
            Err(e) => {
                warn!(tool = %params.name, error = %e, "Tool call failed");
                JsonRpcResponse::success(id, tool_result(format!("Error: {}", e), true))
            }
        }
    }
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": { "tools": { "listChanged": false } },
        "serverInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

/// Every tool the server exposes
pub fn all_tools() -> Vec<Tool> {
    vec![
        get_login_tool(),
        session_tool(
            "annotate_view",
            "Show the current claim, the sentences revealed so far and session progress.",
        ),
        session_tool(
            "annotate_reveal_next",
            "Reveal the next evidence sentence for the current claim. Does nothing once every sentence is shown.",
        ),
        get_decide_tool(),
        session_tool(
            "annotate_commit",
            "Save all pending answers to the results table in one write. Safe to repeat after a failure.",
        ),
        session_tool(
            "annotate_end",
            "Save pending answers and close the session. The session stays open if saving fails.",
        ),
    ]
}

fn tool(name: &str, description: &str, properties: Value, required: &[&str]) -> Tool {
    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false
        }),
    }
}

fn session_id_property() -> Value {
    json!({ "type": "string", "description": "The session ID" })
}

/// A tool whose only argument is the session it acts on
fn session_tool(name: &str, description: &str) -> Tool {
    tool(
        name,
        description,
        json!({ "session_id": session_id_property() }),
        &["session_id"],
    )
}

fn get_login_tool() -> Tool {
    tool(
        "annotate_login",
        "Enter a participant user id and load their assigned examples. Starts a new session unless session_id is given.",
        json!({
            "user_id": {
                "type": "string",
                "description": "Participant user id (e.g., user_1)"
            },
            "session_id": {
                "type": "string",
                "description": "Optional existing session to log in"
            }
        }),
        &["user_id"],
    )
}

fn get_decide_tool() -> Tool {
    tool(
        "annotate_decide",
        "Record whether the revealed evidence supports or refutes the claim, or that no decision is possible, and move to the next example.",
        json!({
            "session_id": session_id_property(),
            "decision": {
                "type": "string",
                "enum": ["support", "refute", "cannot_decide"],
                "description": "The judgment on the current claim"
            }
        }),
        &["session_id", "decision"],
    )
}
