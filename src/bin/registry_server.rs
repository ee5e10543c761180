//! Standalone Registry Service binary: hosts a Tool Catalogue behind the
//! MCP wire protocol over stdio, so the main agent binary can reach it
//! exactly like any other upstream server (§6's `registry-spec` is itself
//! a `url::type` spec).
//!
//! Backed by `rmcp`'s server-side transport rather than the hand-rolled
//! JSON-RPC framing the three client transports use, since a real MCP
//! server implementation is a different surface than dialing one.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use rmcp::handler::server::ServerHandler;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, JsonObject, ListToolsResult, PaginatedRequestParams,
    ServerCapabilities, ServerInfo, Tool as McpTool,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::{ErrorData as McpError, ServiceExt};

use tidesmith::{AgentError, HashEmbedder, InMemoryCatalogue, McpPool, RegistryService, SqliteCatalogue, ToolCatalogue};

#[derive(Parser, Debug)]
#[command(name = "tidesmith-registry", about = "Hosts the Tool Catalogue as an MCP server over stdio")]
struct Cli {
    /// Path to a SQLite database file for persistent storage. When omitted,
    /// the catalogue is in-memory and its contents do not survive restart.
    #[arg(long)]
    db: Option<PathBuf>,
}

struct RegistryServerHandler {
    service: RegistryService,
}

impl RegistryServerHandler {
    fn new(service: RegistryService) -> Self {
        Self { service }
    }
}

impl ServerHandler for RegistryServerHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..ServerInfo::default()
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        async move {
            let tools = self.service.list_tool_specs().into_iter().map(spec_to_mcp_tool).collect();
            Ok(ListToolsResult {
                tools,
                next_cursor: None,
                meta: None,
            })
        }
    }

    async fn call_tool(&self, request: CallToolRequestParams, _context: RequestContext<RoleServer>) -> Result<CallToolResult, McpError> {
        let args = request
            .arguments
            .map(|m| serde_json::Value::Object(m.into_iter().collect()))
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        let result = self.service.call(request.name.as_ref(), args).await;
        Ok(CallToolResult {
            content: vec![Content::text(result.text)],
            is_error: Some(result.is_error),
            structured_content: None,
            meta: None,
        })
    }
}

fn spec_to_mcp_tool(spec: tidesmith::transport::ToolSpec) -> McpTool {
    let input_schema: JsonObject = match spec.input_schema {
        serde_json::Value::Object(m) => m,
        other => {
            let mut m = serde_json::Map::new();
            m.insert("type".to_string(), serde_json::Value::String("object".to_string()));
            m.insert("value".to_string(), other);
            m
        }
    };
    McpTool::new(
        std::borrow::Cow::Owned(spec.name),
        std::borrow::Cow::Owned(spec.description.unwrap_or_default()),
        Arc::new(input_schema),
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let pool: Arc<McpPool> = Arc::new(tidesmith::mcp_client::new_pool());
    let embedder = Arc::new(HashEmbedder::default());

    let catalogue: Arc<dyn ToolCatalogue> = match cli.db {
        Some(path) => Arc::new(SqliteCatalogue::open(path, embedder, pool)?),
        None => Arc::new(InMemoryCatalogue::new(embedder, pool)),
    };

    let handler = RegistryServerHandler::new(RegistryService::new(catalogue));
    let running = handler
        .serve((tokio::io::stdin(), tokio::io::stdout()))
        .await
        .map_err(|e| AgentError::transport(format!("registry server init: {e}")))?;
    running.waiting().await.map_err(|e| AgentError::transport(format!("registry server: {e}")))?;
    Ok(())
}
