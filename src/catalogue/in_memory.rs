//! In-memory Tool Catalogue: a flat embedding table rebuilt on delete.
//!
//! All state lives in process; restart loses it. Good for a single-process
//! deployment or for tests; see [`super::SqliteCatalogue`] for a persistent
//! variant.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::error::AgentError;
use crate::mcp_client::{self, McpPool};
use crate::model::{cosine_similarity, Embedder, ServerDescriptor, ToolDescriptor, ToolOrigin};

use super::{ToolCatalogue, DEFAULT_QUERY_LIMIT};

struct IndexedOrigin {
    origin: ToolOrigin,
    embedding: Vec<f32>,
}

/// In-memory implementation of the Tool Catalogue. Writes take the
/// exclusive `RwLock`; `query_tools`/`list_tools` take the shared one, per
/// §5's single-writer multi-reader discipline. The index is a flat
/// `Vec`-like table rebuilt whenever an entry is removed, since the
/// in-memory variant has no point-deletion support (§9).
pub struct InMemoryCatalogue {
    entries: RwLock<DashMap<(String, String), IndexedOrigin>>,
    embedder: Arc<dyn Embedder>,
    pool: Arc<McpPool>,
}

impl InMemoryCatalogue {
    pub fn new(embedder: Arc<dyn Embedder>, pool: Arc<McpPool>) -> Self {
        Self {
            entries: RwLock::new(DashMap::new()),
            embedder,
            pool,
        }
    }

    fn index_text(tool: &ToolDescriptor) -> String {
        format!("{}: {}", tool.name, tool.description)
    }
}

#[async_trait]
impl ToolCatalogue for InMemoryCatalogue {
    async fn add_server(&self, server: ServerDescriptor) -> Result<Vec<ToolOrigin>, AgentError> {
        let client = mcp_client::acquire(&self.pool, &server).await?;
        let specs = client.list_tools().await?;

        let mut added = Vec::new();
        let mut first_error: Option<AgentError> = None;
        for spec in specs {
            let tool = ToolDescriptor {
                name: spec.name,
                description: spec.description.unwrap_or_default(),
                input_schema: spec.input_schema,
            };
            match self.add_tool(tool, server.clone()).await {
                Ok(origin) => added.push(origin),
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }
        Ok(added)
    }

    async fn add_tool(&self, tool: ToolDescriptor, server: ServerDescriptor) -> Result<ToolOrigin, AgentError> {
        let origin = ToolOrigin { tool, server };
        let text = Self::index_text(&origin.tool);
        let embedding = self
            .embedder
            .embed(&[text.as_str()])
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        let entries = self.entries.write().await;
        entries.insert(origin.key(), IndexedOrigin { origin: origin.clone(), embedding });
        Ok(origin)
    }

    async fn delete_tool(&self, name: &str) -> Result<bool, AgentError> {
        let entries = self.entries.write().await;
        let keys: Vec<(String, String)> = entries
            .iter()
            .filter(|e| e.origin.tool.name == name)
            .map(|e| e.key().clone())
            .collect();
        let removed = !keys.is_empty();
        for key in keys {
            entries.remove(&key);
        }
        Ok(removed)
    }

    async fn query_tools(&self, query: &str, limit: Option<usize>) -> Result<Vec<ToolOrigin>, AgentError> {
        let limit = limit.unwrap_or(DEFAULT_QUERY_LIMIT);
        let biased_query = format!("{query}. Additionally, any relevant connection tools");
        let query_vec = self
            .embedder
            .embed(&[biased_query.as_str()])
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        let entries = self.entries.read().await;
        let mut scored: Vec<(f32, ToolOrigin)> = entries
            .iter()
            .map(|e| (cosine_similarity(&query_vec, &e.embedding), e.origin.clone()))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored.into_iter().take(limit).map(|(_, origin)| origin).collect())
    }

    async fn list_tools(&self, limit: Option<usize>) -> Result<Vec<ToolDescriptor>, AgentError> {
        let entries = self.entries.read().await;
        let iter = entries.iter().map(|e| e.origin.tool.clone());
        Ok(match limit {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HashEmbedder;
    use crate::transport::TransportKind;

    fn fresh_catalogue() -> InMemoryCatalogue {
        InMemoryCatalogue::new(Arc::new(HashEmbedder::default()), Arc::new(mcp_client::new_pool()))
    }

    fn server(url: &str) -> ServerDescriptor {
        ServerDescriptor::new(url, TransportKind::Sse, None)
    }

    fn tool(name: &str, description: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: serde_json::json!({}),
        }
    }

    /// **Scenario**: after `delete_tool`, `query_tools` never surfaces the
    /// deleted name again (P4).
    #[tokio::test]
    async fn delete_tool_removes_from_future_queries() {
        let catalogue = fresh_catalogue();
        catalogue
            .add_tool(tool("weather", "current weather by city"), server("sse://w"))
            .await
            .unwrap();
        catalogue
            .add_tool(tool("search", "web search"), server("sse://s"))
            .await
            .unwrap();

        assert!(catalogue.delete_tool("weather").await.unwrap());

        let results = catalogue.query_tools("weather", None).await.unwrap();
        assert!(results.iter().all(|o| o.tool.name != "weather"));
    }

    /// **Scenario**: `add_tool` upserts on `(server.id, tool.name)` rather
    /// than accumulating duplicates.
    #[tokio::test]
    async fn add_tool_upserts_same_origin() {
        let catalogue = fresh_catalogue();
        catalogue
            .add_tool(tool("search", "v1"), server("sse://s"))
            .await
            .unwrap();
        catalogue
            .add_tool(tool("search", "v2"), server("sse://s"))
            .await
            .unwrap();

        let tools = catalogue.list_tools(None).await.unwrap();
        assert_eq!(tools.iter().filter(|t| t.name == "search").count(), 1);
        assert_eq!(tools.iter().find(|t| t.name == "search").unwrap().description, "v2");
    }
}
