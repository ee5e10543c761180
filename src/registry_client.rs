//! Registry Client: the Toolbox's adapter onto a `RegistryService` reached
//! over an `McpPeer`.
//!
//! Knows the five meta-tool names and how to pull the JSON-tagged block back
//! out of a `ToolCallContent`. Keeps a local snapshot of the registry's own
//! tool specs so the Toolbox can answer `availableTools()` without a round
//! trip, and so dispatch can recognize a registry name without calling out.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::AgentError;
use crate::model::ToolOrigin;
use crate::registry_service::{JSON_BLOCK_TAG, TOOL_ADD_SERVER, TOOL_ADD_TOOL, TOOL_DELETE_TOOL, TOOL_LIST_TOOLS, TOOL_QUERY_TOOLS};
use crate::transport::{McpPeer, ToolSpec};

/// The parsed result of one meta-tool call: the decoded JSON block (or
/// `None` if the call errored) alongside the raw response text, which
/// callers that only need a human summary can use directly.
pub struct RegistryCallResult {
    pub json: Option<Value>,
    pub raw_text: String,
    pub is_error: bool,
}

/// Wraps a connection to the Registry Service. `peer` is any `McpPeer` —
/// in practice a pooled `McpClient` dialed from the registry spec on the
/// command line, exactly like any other upstream server.
pub struct RegistryClient {
    peer: Arc<dyn McpPeer>,
    tool_specs: Vec<ToolSpec>,
}

impl RegistryClient {
    /// Connects and caches the registry's own advertised tool specs (always
    /// the five meta-tools, but fetched rather than hard-coded so a
    /// differently-versioned registry is still reflected faithfully).
    pub async fn connect(peer: Arc<dyn McpPeer>) -> Result<Self, AgentError> {
        let tool_specs = peer.list_tools().await?;
        Ok(Self { peer, tool_specs })
    }

    /// The registry's own tool specs, for merging into the Toolbox's
    /// `availableTools()` surface.
    pub fn tool_specs(&self) -> &[ToolSpec] {
        &self.tool_specs
    }

    /// True if `name` is one of the registry's own meta-tools rather than an
    /// upstream tool — dispatch routes these here instead of to the pool
    /// (I4).
    pub fn is_registry_tool(&self, name: &str) -> bool {
        self.tool_specs.iter().any(|t| t.name == name)
    }

    /// Calls any of the registry's own tool names directly and returns the
    /// decoded result, without the per-tool argument shaping the typed
    /// helper methods below apply. Used by the Toolbox to dispatch a
    /// `ToolUse` block whose name is a meta-tool without re-deriving its
    /// argument shape.
    pub async fn call_raw(&self, name: &str, args: Value) -> Result<RegistryCallResult, AgentError> {
        self.call(name, args).await
    }

    async fn call(&self, name: &str, args: Value) -> Result<RegistryCallResult, AgentError> {
        let content = self.peer.call_tool(name, args).await?;
        let (json_line, summary) = content.text.split_once('\n').unwrap_or((content.text.as_str(), ""));
        let json = json_line
            .strip_prefix(JSON_BLOCK_TAG)
            .and_then(|s| serde_json::from_str::<Value>(s).ok())
            .filter(|v| !v.is_null());
        Ok(RegistryCallResult {
            json,
            raw_text: summary.to_string(),
            is_error: content.is_error,
        })
    }

    pub async fn query_tools(&self, query: &str, limit: Option<usize>) -> Result<Vec<ToolOrigin>, AgentError> {
        let mut args = json!({"query": query});
        if let Some(limit) = limit {
            args["limit"] = json!(limit);
        }
        let result = self.call(TOOL_QUERY_TOOLS, args).await?;
        parse_origins(result)
    }

    pub async fn list_tools(&self) -> Result<Vec<crate::model::ToolDescriptor>, AgentError> {
        let result = self.call(TOOL_LIST_TOOLS, json!({})).await?;
        let value = result.json.ok_or_else(|| AgentError::protocol("list-tools returned no data"))?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn add_server(&self, server_string: &str, auth_token: Option<&str>) -> Result<Vec<ToolOrigin>, AgentError> {
        let mut args = json!({"serverString": server_string});
        if let Some(token) = auth_token {
            args["authToken"] = json!(token);
        }
        let result = self.call(TOOL_ADD_SERVER, args).await?;
        parse_origins(result)
    }

    pub async fn add_tool(&self, tool: &crate::model::ToolDescriptor, server: &crate::model::ServerDescriptor) -> Result<(), AgentError> {
        let args = json!({"tool": tool, "server": server});
        let result = self.call(TOOL_ADD_TOOL, args).await?;
        if result.is_error {
            return Err(AgentError::registration(result.raw_text));
        }
        Ok(())
    }

    pub async fn delete_tool(&self, name: &str) -> Result<bool, AgentError> {
        let result = self.call(TOOL_DELETE_TOOL, json!({"name": name})).await?;
        Ok(result.json.and_then(|v| v.as_bool()).unwrap_or(false))
    }
}

fn parse_origins(result: RegistryCallResult) -> Result<Vec<ToolOrigin>, AgentError> {
    match result.json {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Err(AgentError::protocol(result.raw_text)),
    }
}
