//! MCP Client: the single type the Connection Pool stores, wrapping
//! whichever transport a `ServerDescriptor` names behind one `McpPeer` impl.

use std::sync::Mutex as StdMutex;

use serde_json::Value;

use std::sync::Arc;
use std::time::Duration;

use crate::error::AgentError;
use crate::model::{ConnectionKey, ServerDescriptor};
use crate::pool::{ConnectionPool, DEFAULT_CAPACITY, DEFAULT_TTL};
use async_trait::async_trait;

use crate::transport::{McpPeer, SseSession, StdioSession, ToolCallContent, ToolSpec, TransportKind, WsSession};

/// Live connection to one upstream MCP server. Constructed by the
/// Connection Pool's factory on a cache miss; closed by the pool's
/// disposal hook on eviction or TTL expiry.
pub enum McpClient {
    Stdio(StdMutex<StdioSession>),
    Sse(SseSession),
    Ws(WsSession),
}

impl McpClient {
    /// Opens a fresh client for `server`, completing the initialize
    /// handshake before returning. Stdio specs are parsed as
    /// `command arg1 arg2 ...`; sse/ws specs use `server.url` directly.
    pub async fn connect(server: &ServerDescriptor) -> Result<Self, AgentError> {
        match server.transport {
            TransportKind::Stdio => {
                let mut parts = server.url.split_whitespace();
                let command = parts
                    .next()
                    .ok_or_else(|| AgentError::configuration("empty stdio command"))?
                    .to_string();
                let args: Vec<String> = parts.map(String::from).collect();
                let session = tokio::task::spawn_blocking(move || {
                    StdioSession::new(command, args, None, false)
                })
                .await
                .map_err(|e| AgentError::transport(e.to_string()))?
                .map_err(|e| AgentError::transport(e.to_string()))?;
                Ok(McpClient::Stdio(StdMutex::new(session)))
            }
            TransportKind::Sse => {
                let mut headers = Vec::new();
                if let Some(token) = &server.auth_token {
                    headers.push(("Authorization".to_string(), format!("Bearer {token}")));
                }
                Ok(McpClient::Sse(SseSession::new(server.url.clone(), headers).await?))
            }
            TransportKind::Ws => Ok(McpClient::Ws(WsSession::new(server.url.clone()).await?)),
        }
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolSpec>, AgentError> {
        match self {
            McpClient::Stdio(s) => s.list_tools().await,
            McpClient::Sse(s) => s.list_tools().await,
            McpClient::Ws(s) => s.list_tools().await,
        }
    }

    pub async fn call_tool(&self, name: &str, args: Value) -> Result<ToolCallContent, AgentError> {
        match self {
            McpClient::Stdio(s) => s.call_tool(name, args).await,
            McpClient::Sse(s) => s.call_tool(name, args).await,
            McpClient::Ws(s) => s.call_tool(name, args).await,
        }
    }

    /// Closes the underlying transport. Stdio drops the child process and
    /// its pipes; sse/ws simply drop the connection.
    pub async fn close(self) {
        match self {
            McpClient::Stdio(s) => drop(s),
            McpClient::Sse(s) => drop(s),
            McpClient::Ws(s) => drop(s),
        }
    }
}

#[async_trait]
impl McpPeer for McpClient {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, AgentError> {
        McpClient::list_tools(self).await
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallContent, AgentError> {
        McpClient::call_tool(self, name, arguments).await
    }
}

/// The process-global Connection Pool type: keyed by `ConnectionKey`
/// (§3), valued by a reference-counted `McpClient` so eviction can drop
/// the last strong reference without racing an in-flight call.
pub type McpPool = ConnectionPool<ConnectionKey, Arc<McpClient>>;

/// Builds the pool with the spec's default capacity and TTL (§4.3); the
/// disposal hook closes the evicted client and swallows failures (a
/// disposal error is logged and never blocks the eviction that caused it).
pub fn new_pool() -> McpPool {
    ConnectionPool::new(DEFAULT_CAPACITY, DEFAULT_TTL, |client: Arc<McpClient>| async move {
        match Arc::try_unwrap(client) {
            Ok(client) => client.close().await,
            Err(_) => tracing::debug!("pooled client still referenced at disposal time"),
        }
    })
}

/// Builds a pool with explicit capacity/TTL, for callers that override the
/// defaults via configuration.
pub fn new_pool_with(capacity: usize, ttl: Duration) -> McpPool {
    ConnectionPool::new(capacity, ttl, |client: Arc<McpClient>| async move {
        match Arc::try_unwrap(client) {
            Ok(client) => client.close().await,
            Err(_) => tracing::debug!("pooled client still referenced at disposal time"),
        }
    })
}

/// Acquires a pooled client for `server`, connecting via `McpClient::connect`
/// on a miss.
pub async fn acquire(pool: &McpPool, server: &ServerDescriptor) -> Result<Arc<McpClient>, AgentError> {
    let key = server.id();
    let server = server.clone();
    pool.acquire(key, || async move { McpClient::connect(&server).await.map(Arc::new) })
        .await
}
