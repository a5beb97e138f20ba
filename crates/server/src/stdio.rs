//! JSON-RPC 2.0 over stdio, one message per line.
//!
//! The loop answers protocol methods inline and spawns each `tools/call`
//! onto its own task, so a slow AnkiConnect round trip never blocks the
//! next request. Responses from concurrent calls funnel through a single
//! writer task and are matched up by request id on the client side.
//!
//! stdout carries only protocol frames; diagnostics go to stderr.

use crate::error::Result;
use crate::tools::AnkiToolSource;
use rmcp::model::{ErrorCode, ListToolsResult, RequestId};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// MCP protocol revision this server implements.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    // Absent for notifications.
    #[serde(default)]
    id: Option<RequestId>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    // Stays `null` when answering a message whose id never parsed.
    id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
struct RpcError {
    code: ErrorCode,
    message: String,
}

impl JsonRpcResponse {
    fn ok(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Option<RequestId>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    // Absent arguments mean "no arguments"; extra members like _meta pass
    // through serde untouched.
    #[serde(default)]
    arguments: Value,
}

/// MCP server over a line-delimited JSON-RPC transport.
pub struct McpServer {
    tools: AnkiToolSource,
}

impl McpServer {
    #[must_use]
    pub fn new(tools: AnkiToolSource) -> Self {
        Self { tools }
    }

    /// Serve on this process's stdin/stdout until stdin closes.
    ///
    /// # Errors
    ///
    /// Returns an error if reading stdin fails or a response of our own
    /// making cannot be serialized.
    pub async fn run_stdio(self) -> Result<()> {
        self.run(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve on an arbitrary reader/writer pair until the reader closes.
    /// In-flight tool calls are drained before returning.
    ///
    /// # Errors
    ///
    /// See [`McpServer::run_stdio`].
    pub async fn run<R, W>(self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<String>(64);
        let writer_task = tokio::spawn(write_loop(writer, rx));

        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            self.handle_line(line, &tx).await?;
            if tx.is_closed() {
                // Writer is gone (closed stdout); no point reading on.
                break;
            }
        }

        // Dropping our sender lets the writer drain whatever the in-flight
        // tool tasks still hold and then exit.
        drop(tx);
        let _ = writer_task.await;
        Ok(())
    }

    async fn handle_line(&self, line: &str, tx: &mpsc::Sender<String>) -> Result<()> {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "unparsable message");
                let response =
                    JsonRpcResponse::err(None, ErrorCode::PARSE_ERROR, format!("parse error: {e}"));
                return send_response(tx, &response).await;
            }
        };

        let Some(id) = request.id else {
            // Notifications (initialized, cancelled, ...) are consumed and
            // never answered.
            debug!(method = %request.method, "notification received");
            return Ok(());
        };

        if request.jsonrpc != JSONRPC_VERSION {
            let response = JsonRpcResponse::err(
                Some(id),
                ErrorCode::INVALID_REQUEST,
                format!("unsupported jsonrpc version '{}'", request.jsonrpc),
            );
            return send_response(tx, &response).await;
        }

        match request.method.as_str() {
            "initialize" => send_response(tx, &JsonRpcResponse::ok(id, initialize_result())).await,
            "ping" => send_response(tx, &JsonRpcResponse::ok(id, json!({}))).await,
            "tools/list" => {
                let result = ListToolsResult {
                    tools: self.tools.list_tools(),
                    ..Default::default()
                };
                let response = JsonRpcResponse::ok(id, serde_json::to_value(result)?);
                send_response(tx, &response).await
            }
            "resources/list" => {
                send_response(tx, &JsonRpcResponse::ok(id, json!({"resources": []}))).await
            }
            "prompts/list" => {
                send_response(tx, &JsonRpcResponse::ok(id, json!({"prompts": []}))).await
            }
            "tools/call" => {
                let params: CallToolParams = match serde_json::from_value(request.params) {
                    Ok(params) => params,
                    Err(e) => {
                        let response = JsonRpcResponse::err(
                            Some(id),
                            ErrorCode::INVALID_PARAMS,
                            format!("invalid tools/call params: {e}"),
                        );
                        return send_response(tx, &response).await;
                    }
                };
                self.spawn_tool_call(id, params, tx.clone());
                Ok(())
            }
            other => {
                let response = JsonRpcResponse::err(
                    Some(id),
                    ErrorCode::METHOD_NOT_FOUND,
                    format!("method not found: {other}"),
                );
                send_response(tx, &response).await
            }
        }
    }

    fn spawn_tool_call(&self, id: RequestId, params: CallToolParams, tx: mpsc::Sender<String>) {
        let tools = self.tools.clone();
        tokio::spawn(async move {
            let response = match tools.call_tool(&params.name, params.arguments).await {
                Ok(result) => match serde_json::to_value(result) {
                    Ok(v) => JsonRpcResponse::ok(id, v),
                    Err(e) => {
                        error!(error = %e, "tool result serialization failed");
                        JsonRpcResponse::err(
                            Some(id),
                            ErrorCode::INTERNAL_ERROR,
                            "tool result serialization failed",
                        )
                    }
                },
                Err(e) => JsonRpcResponse::err(Some(id), ErrorCode::INVALID_PARAMS, e.to_string()),
            };
            if let Err(e) = send_response(&tx, &response).await {
                error!(error = %e, "response serialization failed");
            }
        });
    }
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": { "tools": {} },
        "serverInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
        "instructions": "Tools for managing Anki flashcards through a running Anki desktop \
            instance. Anki must be open with the AnkiConnect add-on installed for any call \
            to succeed.",
    })
}

async fn send_response(tx: &mpsc::Sender<String>, response: &JsonRpcResponse) -> Result<()> {
    let line = serde_json::to_string(response)?;
    // A send failure means the writer is gone; the read loop notices via
    // is_closed and winds down.
    let _ = tx.send(line).await;
    Ok(())
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::Receiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        if let Err(e) = write_line(&mut writer, &line).await {
            warn!(error = %e, "write failed; dropping remaining responses");
            break;
        }
    }
}

async fn write_line<W>(writer: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
