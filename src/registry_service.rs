//! Registry Service: the Tool Catalogue, addressable as an MCP server.
//!
//! Exposes exactly five tools (§4.6). Every response carries a JSON-tagged
//! text block (so a `RegistryClient` can pick it out unambiguously) and a
//! second, human-readable summary block. On error the JSON block is `null`
//! and the summary carries the error message.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::catalogue::{ServerDescriptor, ToolCatalogue, ToolDescriptor};
use crate::error::AgentError;
use crate::transport::ToolCallContent;

/// Tag prefix a `RegistryClient` looks for to find the machine-readable
/// block among a response's text content.
pub const JSON_BLOCK_TAG: &str = "REGISTRY_JSON:";

pub const TOOL_QUERY_TOOLS: &str = "query-tools";
pub const TOOL_LIST_TOOLS: &str = "list-tools";
pub const TOOL_ADD_TOOL: &str = "add-tool";
pub const TOOL_ADD_SERVER: &str = "add-server";
pub const TOOL_DELETE_TOOL: &str = "delete-tool";

/// All meta-tool names the Registry Service exposes; a Toolbox checks
/// membership here before deciding whether to route a call to the
/// `RegistryClient` (I4 — registry names always win at dispatch).
pub const META_TOOL_NAMES: &[&str] = &[
    TOOL_QUERY_TOOLS,
    TOOL_LIST_TOOLS,
    TOOL_ADD_TOOL,
    TOOL_ADD_SERVER,
    TOOL_DELETE_TOOL,
];

/// Hosts a `ToolCatalogue` and answers `tools/list` and `tools/call` for
/// the five meta-tools. Wire-level request/response plumbing (stdio,
/// SSE, or websocket) lives in `bin/registry_server.rs`; this type only
/// holds the dispatch logic so it can be unit-tested without a transport.
pub struct RegistryService {
    catalogue: Arc<dyn ToolCatalogue>,
}

impl RegistryService {
    pub fn new(catalogue: Arc<dyn ToolCatalogue>) -> Self {
        Self { catalogue }
    }

    pub fn list_tool_specs(&self) -> Vec<crate::transport::ToolSpec> {
        vec![
            spec(
                TOOL_QUERY_TOOLS,
                "Search the tool registry by semantic similarity and return matching tool origins.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string"},
                        "limit": {"type": "number"}
                    },
                    "required": ["query"]
                }),
            ),
            spec(
                TOOL_LIST_TOOLS,
                "Enumerate every tool known to the registry.",
                json!({"type": "object", "properties": {}}),
            ),
            spec(
                TOOL_ADD_TOOL,
                "Add a single tool descriptor to the registry.",
                json!({
                    "type": "object",
                    "properties": {"tool": {"type": "object"}},
                    "required": ["tool"]
                }),
            ),
            spec(
                TOOL_ADD_SERVER,
                "Connect to an MCP server and register every tool it advertises.",
                json!({
                    "type": "object",
                    "properties": {
                        "serverString": {"type": "string", "description": "url::type"},
                        "authToken": {"type": "string"}
                    },
                    "required": ["serverString"]
                }),
            ),
            spec(
                TOOL_DELETE_TOOL,
                "Remove a tool from the registry by name.",
                json!({
                    "type": "object",
                    "properties": {"name": {"type": "string"}},
                    "required": ["name"]
                }),
            ),
        ]
    }

    /// Dispatches one `tools/call` by meta-tool name. Returns the dual-block
    /// `ToolCallContent` the wire layer serializes back to the caller.
    pub async fn call(&self, name: &str, args: Value) -> ToolCallContent {
        let result = match name {
            TOOL_QUERY_TOOLS => self.query_tools(args).await,
            TOOL_LIST_TOOLS => self.list_tools(args).await,
            TOOL_ADD_TOOL => self.add_tool(args).await,
            TOOL_ADD_SERVER => self.add_server(args).await,
            TOOL_DELETE_TOOL => self.delete_tool(args).await,
            other => Err(AgentError::protocol(format!("unknown registry tool '{other}'"))),
        };
        match result {
            Ok((json_value, summary)) => envelope(Some(json_value), &summary, false),
            Err(e) => envelope(None, &e.to_string(), true),
        }
    }

    async fn query_tools(&self, args: Value) -> Result<(Value, String), AgentError> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AgentError::protocol("query-tools requires 'query'"))?;
        let limit = args.get("limit").and_then(|v| v.as_u64()).map(|n| n as usize);
        let origins = self.catalogue.query_tools(query, limit).await?;
        let summary = format!("found {} matching tool(s) for '{query}'", origins.len());
        Ok((origins_to_json(&origins), summary))
    }

    async fn list_tools(&self, _args: Value) -> Result<(Value, String), AgentError> {
        let tools = self.catalogue.list_tools(None).await?;
        let summary = format!("{} tool(s) known to the registry", tools.len());
        Ok((serde_json::to_value(&tools)?, summary))
    }

    async fn add_tool(&self, args: Value) -> Result<(Value, String), AgentError> {
        let tool_value = args.get("tool").cloned().ok_or_else(|| AgentError::protocol("add-tool requires 'tool'"))?;
        let tool: ToolDescriptor = serde_json::from_value(tool_value)?;
        let server = args
            .get("server")
            .cloned()
            .map(serde_json::from_value::<ServerDescriptor>)
            .transpose()?
            .ok_or_else(|| AgentError::protocol("add-tool requires 'server'"))?;
        let origin = self.catalogue.add_tool(tool, server).await?;
        let summary = format!("added tool '{}'", origin.tool.name);
        Ok((serde_json::to_value(&origin.tool)?, summary))
    }

    async fn add_server(&self, args: Value) -> Result<(Value, String), AgentError> {
        let server_string = args
            .get("serverString")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AgentError::protocol("add-server requires 'serverString'"))?;
        let mut server = ServerDescriptor::parse(server_string)?;
        if let Some(token) = args.get("authToken").and_then(|v| v.as_str()) {
            server.auth_token = Some(token.to_string());
        }
        let origins = self.catalogue.add_server(server).await?;
        let summary = format!("added {} tool(s) from '{server_string}'", origins.len());
        Ok((origins_to_json(&origins), summary))
    }

    async fn delete_tool(&self, args: Value) -> Result<(Value, String), AgentError> {
        let name = args
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AgentError::protocol("delete-tool requires 'name'"))?;
        let removed = self.catalogue.delete_tool(name).await?;
        let summary = if removed {
            format!("deleted tool '{name}'")
        } else {
            format!("no tool named '{name}' was found")
        };
        Ok((Value::Bool(removed), summary))
    }
}

fn spec(name: &str, description: &str, input_schema: Value) -> crate::transport::ToolSpec {
    crate::transport::ToolSpec {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema,
    }
}

fn origins_to_json(origins: &[crate::catalogue::ToolOrigin]) -> Value {
    json!(origins)
}

/// Builds the two-block response: a JSON-tagged block (or `null` on error)
/// and a human summary.
fn envelope(json_value: Option<Value>, summary: &str, is_error: bool) -> ToolCallContent {
    let json_text = format!("{JSON_BLOCK_TAG}{}", serde_json::to_string(&json_value.unwrap_or(Value::Null)).unwrap_or_default());
    ToolCallContent {
        text: format!("{json_text}\n{summary}"),
        is_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::InMemoryCatalogue;
    use crate::mcp_client;
    use crate::model::HashEmbedder;
    use crate::transport::TransportKind;

    fn service() -> RegistryService {
        let catalogue = InMemoryCatalogue::new(Arc::new(HashEmbedder::default()), Arc::new(mcp_client::new_pool()));
        RegistryService::new(Arc::new(catalogue))
    }

    /// **Scenario**: add-tool then list-tools round-trips through the
    /// JSON-tagged envelope.
    #[tokio::test]
    async fn add_tool_then_list_tools() {
        let svc = service();
        let add_args = json!({
            "tool": {"name": "weather", "description": "current weather", "input_schema": {}},
            "server": {"url": "sse://w", "transport": "sse", "auth_token": null},
        });
        let result = svc.call(TOOL_ADD_TOOL, add_args).await;
        assert!(result.text.contains("added tool 'weather'"));

        let list = svc.call(TOOL_LIST_TOOLS, json!({})).await;
        assert!(list.text.contains("weather"));
        let _ = TransportKind::Sse;
    }

    /// **Scenario**: delete-tool on an unknown name reports zero removals
    /// without erroring.
    #[tokio::test]
    async fn delete_unknown_tool_is_not_an_error() {
        let svc = service();
        let result = svc.call(TOOL_DELETE_TOOL, json!({"name": "ghost"})).await;
        assert!(!result.is_error);
        assert!(result.text.contains("no tool named"));
    }

    /// **Scenario**: a malformed call (missing required argument) is
    /// flagged `is_error` with a `null` JSON block, so a `RegistryClient`
    /// never mistakes a failure for an empty success.
    #[tokio::test]
    async fn malformed_call_is_flagged_as_an_error() {
        let svc = service();
        let result = svc.call(TOOL_QUERY_TOOLS, json!({})).await;
        assert!(result.is_error);
        assert!(result.text.starts_with(&format!("{JSON_BLOCK_TAG}null")));
    }
}
