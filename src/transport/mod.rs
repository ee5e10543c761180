//! Transport: a framed, bidirectional channel to one MCP peer.
//!
//! Three variants share one contract: open, send one framed JSON-RPC-shaped
//! message, deliver inbound messages, and close. Stdio spawns a child
//! process; SSE uses long-poll HTTP; websocket is symmetric frames. Errors
//! during open are fatal for that transport instance — callers discard it
//! and let a later `acquire` build a fresh one.

mod sse;
mod stdio;
mod ws;

use std::fmt;
use std::str::FromStr;

pub use sse::SseSession;
pub use stdio::{StdioSession, StdioSessionError};
pub use ws::WsSession;

use serde_json::Value;

use crate::error::AgentError;

/// Kind of transport a `ServerDescriptor` names. Mirrors the three wire
/// shapes the spec enumerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Stdio,
    Sse,
    Ws,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportKind::Stdio => "stdio",
            TransportKind::Sse => "sse",
            TransportKind::Ws => "ws",
        };
        f.write_str(s)
    }
}

impl FromStr for TransportKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stdio" => Ok(TransportKind::Stdio),
            "sse" => Ok(TransportKind::Sse),
            "ws" => Ok(TransportKind::Ws),
            other => Err(AgentError::configuration(format!(
                "unknown transport type '{other}' (expected stdio, sse, or ws)"
            ))),
        }
    }
}

/// Result of a single `tools/call`, before the Toolbox wraps it into a
/// `ToolResult` content block.
#[derive(Debug, Clone)]
pub struct ToolCallContent {
    pub text: String,
    pub is_error: bool,
}

/// One advertised tool, in the shape MCP's `tools/list` returns it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

/// Thin request/response layer over one of the three transports. Exposes
/// `list_tools` and `call_tool`; the initialize handshake happens once at
/// construction and is not part of this trait's surface.
#[async_trait::async_trait]
pub trait McpPeer: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, AgentError>;
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallContent, AgentError>;
}

/// Parses a `tools/list` JSON-RPC result payload into `Vec<ToolSpec>`.
pub(crate) fn parse_list_tools_result(result: Value) -> Result<Vec<ToolSpec>, AgentError> {
    let tools_array = result
        .get("tools")
        .and_then(|v| v.as_array())
        .ok_or_else(|| AgentError::protocol("no tools array in tools/list response"))?;
    let mut specs = Vec::with_capacity(tools_array.len());
    for t in tools_array {
        let name = t
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let description = t
            .get("description")
            .and_then(|v| v.as_str())
            .map(String::from);
        let input_schema = t
            .get("inputSchema")
            .cloned()
            .unwrap_or(Value::Object(serde_json::Map::new()));
        specs.push(ToolSpec {
            name,
            description,
            input_schema,
        });
    }
    Ok(specs)
}

/// Parses a `tools/call` JSON-RPC result payload into `ToolCallContent`.
/// Image content parts are rejected per the spec's ingest rule (§4.2): a
/// tool result is either text or an error, never an image.
pub(crate) fn parse_call_tool_result(result: Value) -> Result<ToolCallContent, AgentError> {
    let is_error = result
        .get("isError")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let content_array = result.get("content").and_then(|c| c.as_array());
    if let Some(items) = content_array {
        if items
            .iter()
            .any(|b| b.get("type").and_then(|t| t.as_str()) == Some("image"))
        {
            return Err(AgentError::protocol(
                "image content in tool result is not supported",
            ));
        }
    }

    let mut text_parts = Vec::new();
    if let Some(items) = content_array {
        for block in items {
            if block.get("type").and_then(|t| t.as_str()) == Some("text") {
                if let Some(t) = block.get("text").and_then(|v| v.as_str()) {
                    text_parts.push(t);
                }
            }
        }
    }
    let mut text = text_parts.join("\n").trim().to_string();
    if text.is_empty() {
        if let Some(structured) = result.get("structuredContent") {
            text = serde_json::to_string(structured).unwrap_or_default();
        }
    }
    if text.is_empty() {
        text = if is_error {
            "tool returned an error with no message".to_string()
        } else {
            String::new()
        };
    }
    Ok(ToolCallContent { text, is_error })
}
