//! SSE transport: long-poll HTTP, one POST per JSON-RPC message.
//!
//! Implements MCP's Streamable-HTTP shape: POST JSON-RPC to a URL, accept
//! either a plain `application/json` body or a `text/event-stream` framed
//! response, and carry forward an optional `MCP-Session-Id` the server may
//! hand back on `initialize`.

use std::sync::Mutex;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AgentError;

use super::{parse_call_tool_result, parse_list_tools_result, McpPeer, ToolCallContent, ToolSpec};

const MCP_PROTOCOL_VERSION: &str = "2025-11-25";
const INITIALIZE_REQUEST_ID: &str = "tidesmith-initialize";

#[derive(Debug, Deserialize)]
struct JsonRpcErrorBody {
    #[allow(dead_code)]
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcErrorBody>,
}

fn parse_json_rpc_from_body(
    body: &str,
    content_type: Option<&reqwest::header::HeaderValue>,
) -> Result<JsonRpcResponse, AgentError> {
    let is_sse = content_type
        .and_then(|v| v.to_str().ok())
        .map(|s| s.contains("text/event-stream"))
        .unwrap_or(false);

    if !is_sse {
        return serde_json::from_str(body)
            .map_err(|e| AgentError::transport(format!("response json: {e}")));
    }

    let mut data_buffer = String::new();
    let mut flush = |buf: &mut String| -> Option<JsonRpcResponse> {
        if buf.is_empty() {
            return None;
        }
        let parsed = serde_json::from_str::<JsonRpcResponse>(buf).ok();
        buf.clear();
        parsed.filter(|r| r.result.is_some() || r.error.is_some())
    };
    for line in body.lines() {
        if let Some(data) = line.strip_prefix("data: ") {
            if data.is_empty() || data == "[DONE]" {
                if let Some(r) = flush(&mut data_buffer) {
                    return Ok(r);
                }
                continue;
            }
            if data_buffer.is_empty() {
                data_buffer = data.to_string();
            } else {
                data_buffer.push('\n');
                data_buffer.push_str(data);
            }
            if let Ok(r) = serde_json::from_str::<JsonRpcResponse>(&data_buffer) {
                if r.result.is_some() || r.error.is_some() {
                    return Ok(r);
                }
            }
        } else if line.trim().is_empty() {
            if let Some(r) = flush(&mut data_buffer) {
                return Ok(r);
            }
        }
    }
    if let Some(r) = flush(&mut data_buffer) {
        return Ok(r);
    }
    Err(AgentError::transport(
        "SSE stream: no JSON-RPC response (result/error) found",
    ))
}

/// One HTTP(S) MCP endpoint with its initialize handshake already completed.
pub struct SseSession {
    client: Client,
    url: String,
    headers: Vec<(String, String)>,
    session_id: Mutex<Option<String>>,
}

impl SseSession {
    pub async fn new(
        url: impl Into<String>,
        headers: Vec<(String, String)>,
    ) -> Result<Self, AgentError> {
        let url = url.into();
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| AgentError::transport(e.to_string()))?;
        let mut session = Self {
            client,
            url,
            headers,
            session_id: Mutex::new(None),
        };
        session.initialize().await?;
        Ok(session)
    }

    fn request_builder(&self, body: Vec<u8>) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .header("MCP-Protocol-Version", MCP_PROTOCOL_VERSION)
            .body(body);
        for (k, v) in &self.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        if let Ok(guard) = self.session_id.lock() {
            if let Some(sid) = guard.as_ref() {
                req = req.header("MCP-Session-Id", sid.as_str());
            }
        }
        req
    }

    async fn initialize(&mut self) -> Result<(), AgentError> {
        let params = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "clientInfo": { "name": "tidesmith", "version": env!("CARGO_PKG_VERSION") },
        });
        let body = json!({
            "jsonrpc": "2.0",
            "id": INITIALIZE_REQUEST_ID,
            "method": "initialize",
            "params": params,
        });
        let resp = self
            .request_builder(serde_json::to_vec(&body)?)
            .send()
            .await
            .map_err(|e| AgentError::transport(e.to_string()))?;
        let status = resp.status();
        if let Some(sid) = resp
            .headers()
            .get("MCP-Session-Id")
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.lock().unwrap() = Some(sid.to_string());
        }
        if status != reqwest::StatusCode::ACCEPTED {
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(AgentError::transport(format!("initialize HTTP {status}: {text}")));
            }
            let content_type = resp.headers().get("content-type").cloned();
            let text = resp.text().await.map_err(|e| AgentError::transport(e.to_string()))?;
            let parsed = parse_json_rpc_from_body(&text, content_type.as_ref())?;
            if let Some(err) = parsed.error {
                return Err(AgentError::protocol(format!("initialize: {}", err.message)));
            }
        }

        let notif = json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized",
            "params": {},
        });
        let resp2 = self
            .request_builder(serde_json::to_vec(&notif)?)
            .send()
            .await
            .map_err(|e| AgentError::transport(e.to_string()))?;
        if resp2.status() != reqwest::StatusCode::ACCEPTED && !resp2.status().is_success() {
            return Err(AgentError::transport(format!(
                "notifications/initialized HTTP {}",
                resp2.status()
            )));
        }
        Ok(())
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, AgentError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": format!("tidesmith-{method}"),
            "method": method,
            "params": params,
        });
        let resp = self
            .request_builder(serde_json::to_vec(&body)?)
            .send()
            .await
            .map_err(|e| AgentError::transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AgentError::transport(format!("{method} HTTP {status}: {text}")));
        }
        let content_type = resp.headers().get("content-type").cloned();
        let text = resp.text().await.map_err(|e| AgentError::transport(e.to_string()))?;
        let parsed = parse_json_rpc_from_body(&text, content_type.as_ref())?;
        if let Some(err) = parsed.error {
            return Err(AgentError::protocol(err.message));
        }
        Ok(parsed.result.unwrap_or(Value::Null))
    }
}

#[async_trait::async_trait]
impl McpPeer for SseSession {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, AgentError> {
        let result = self
            .request("tools/list", Value::Object(serde_json::Map::new()))
            .await?;
        parse_list_tools_result(result)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallContent, AgentError> {
        let params = json!({ "name": name, "arguments": arguments });
        let result = self.request("tools/call", params).await?;
        parse_call_tool_result(result)
    }
}
