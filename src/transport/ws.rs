//! Websocket transport: symmetric JSON-RPC frames over one connection.
//!
//! Outbound requests are written directly; inbound frames are read by a
//! background task and routed to the waiting caller by request id via a
//! pending-request table, mirroring the stdio transport's callback-to-channel
//! shape but keyed so concurrent calls on the same session don't block each
//! other.

use std::time::Duration;

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::error::AgentError;

use super::{parse_call_tool_result, parse_list_tools_result, McpPeer, ToolCallContent, ToolSpec};

const MCP_PROTOCOL_VERSION: &str = "2025-11-25";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

type WsWriter = futures_util::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// One websocket MCP connection with the initialize handshake already
/// completed. The read half runs in a background task for the lifetime of
/// this session; dropping it aborts the task.
pub struct WsSession {
    writer: Mutex<WsWriter>,
    pending: std::sync::Arc<DashMap<String, oneshot::Sender<Value>>>,
    reader_task: tokio::task::JoinHandle<()>,
}

impl Drop for WsSession {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

impl WsSession {
    pub async fn new(url: impl Into<String>) -> Result<Self, AgentError> {
        let url = url.into();
        let (ws, _) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(&url))
            .await
            .map_err(|_| AgentError::transport("connect timeout"))?
            .map_err(|e| AgentError::transport(e.to_string()))?;

        let (writer, mut reader) = ws.split();
        let pending: std::sync::Arc<DashMap<String, oneshot::Sender<Value>>> =
            std::sync::Arc::new(DashMap::new());
        let pending_for_task = pending.clone();

        let reader_task = tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                let Ok(Message::Text(text)) = frame else {
                    continue;
                };
                let Ok(parsed) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                let Some(id) = parsed.get("id").and_then(|v| v.as_str().map(String::from).or_else(|| v.as_i64().map(|n| n.to_string()))) else {
                    continue;
                };
                if let Some((_, sender)) = pending_for_task.remove(&id) {
                    let _ = sender.send(parsed);
                }
            }
        });

        let mut session = Self {
            writer: Mutex::new(writer),
            pending,
            reader_task,
        };
        session.initialize().await?;
        Ok(session)
    }

    async fn send(&self, id: &str, method: &str, params: Value) -> Result<oneshot::Receiver<Value>, AgentError> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id.to_string(), tx);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let mut writer = self.writer.lock().await;
        writer
            .send(Message::Text(body.to_string()))
            .await
            .map_err(|e| AgentError::transport(e.to_string()))?;
        drop(writer);
        Ok(rx)
    }

    async fn request(&self, id: &str, method: &str, params: Value) -> Result<Value, AgentError> {
        let rx = self.send(id, method, params).await?;
        let response = tokio::time::timeout(CALL_TIMEOUT, rx)
            .await
            .map_err(|_| AgentError::transport(format!("timeout waiting for {method}")))?
            .map_err(|_| AgentError::transport("websocket session closed"))?;
        if let Some(err) = response.get("error") {
            let message = err
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error")
                .to_string();
            return Err(AgentError::protocol(message));
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn initialize(&mut self) -> Result<(), AgentError> {
        let params = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "clientInfo": { "name": "tidesmith", "version": env!("CARGO_PKG_VERSION") },
        });
        self.request("tidesmith-initialize", "initialize", params).await?;

        let notif = json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized",
            "params": {},
        });
        let mut writer = self.writer.lock().await;
        writer
            .send(Message::Text(notif.to_string()))
            .await
            .map_err(|e| AgentError::transport(e.to_string()))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl McpPeer for WsSession {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, AgentError> {
        let result = self
            .request("tidesmith-tools-list", "tools/list", Value::Object(serde_json::Map::new()))
            .await?;
        parse_list_tools_result(result)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallContent, AgentError> {
        let id = format!("tidesmith-call-{name}");
        let params = json!({ "name": name, "arguments": arguments });
        let result = self.request(&id, "tools/call", params).await?;
        parse_call_tool_result(result)
    }
}
