//! Persistent Tool Catalogue backed by SQLite + sqlite-vec.
//!
//! Dual-table design, same shape as a document store that supports
//! JSON-path get/set and batch get: `catalogue_meta` holds the
//! `ToolOrigin` JSON keyed by `"{server.url}-{tool.name}"`, and a `vec0`
//! virtual table holds the matching embedding for KNN similarity search.

use std::path::PathBuf;
use std::sync::{Arc, Once};

use async_trait::async_trait;
use rusqlite::{params, Connection};
use tokio::sync::Mutex;

use crate::error::AgentError;
use crate::mcp_client::{self, McpPool};
use crate::model::{Embedder, ServerDescriptor, ToolDescriptor, ToolOrigin};

use super::{ToolCatalogue, DEFAULT_QUERY_LIMIT};

static SQLITE_VEC_INIT: Once = Once::new();

fn doc_key(server_url: &str, tool_name: &str) -> String {
    format!("{server_url}-{tool_name}")
}

fn vector_to_json(v: &[f32]) -> String {
    let parts: Vec<String> = v.iter().map(|f| f.to_string()).collect();
    format!("[{}]", parts.join(","))
}

/// SQLite-backed Tool Catalogue. Key: `"{server.url}-{tool.name}"`. Value
/// stored as JSON; embeddings live in a `vec0` virtual table so
/// `query_tools` can run a KNN search instead of a full in-memory scan.
pub struct SqliteCatalogue {
    conn: Mutex<Connection>,
    embedder: Arc<dyn Embedder>,
    pool: Arc<McpPool>,
    vec_table: String,
}

impl SqliteCatalogue {
    pub fn open(path: impl Into<PathBuf>, embedder: Arc<dyn Embedder>, pool: Arc<McpPool>) -> Result<Self, AgentError> {
        SQLITE_VEC_INIT.call_once(|| unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite_vec::sqlite3_vec_init as *const (),
            )));
        });

        let conn = Connection::open(path.into()).map_err(|e| AgentError::configuration(e.to_string()))?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS catalogue_meta (
                doc_key TEXT PRIMARY KEY,
                tool_name TEXT NOT NULL,
                origin_json TEXT NOT NULL
            )
            "#,
            [],
        )
        .map_err(|e| AgentError::configuration(e.to_string()))?;

        let dimension = embedder.dimension();
        let vec_table = "catalogue_vec_embeddings".to_string();
        conn.execute(
            &format!("CREATE VIRTUAL TABLE IF NOT EXISTS {vec_table} USING vec0(doc_key TEXT PRIMARY KEY, embedding float[{dimension}])"),
            [],
        )
        .map_err(|e| AgentError::configuration(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
            embedder,
            pool,
            vec_table,
        })
    }

    fn index_text(tool: &ToolDescriptor) -> String {
        format!("{}: {}", tool.name, tool.description)
    }
}

#[async_trait]
impl ToolCatalogue for SqliteCatalogue {
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

        let key = doc_key(&origin.server.url, &origin.tool.name);
        let origin_json = serde_json::to_string(&origin)?;
        let vec_json = vector_to_json(&embedding);
        let vec_table = self.vec_table.clone();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO catalogue_meta (doc_key, tool_name, origin_json) VALUES (?1, ?2, ?3)
             ON CONFLICT(doc_key) DO UPDATE SET tool_name = excluded.tool_name, origin_json = excluded.origin_json",
            params![key, origin.tool.name, origin_json],
        )
        .map_err(|e| AgentError::protocol(e.to_string()))?;
        conn.execute(&format!("DELETE FROM {vec_table} WHERE doc_key = ?1"), params![key])
            .map_err(|e| AgentError::protocol(e.to_string()))?;
        conn.execute(
            &format!("INSERT INTO {vec_table} (doc_key, embedding) VALUES (?1, ?2)"),
            params![key, vec_json],
        )
        .map_err(|e| AgentError::protocol(e.to_string()))?;

        Ok(origin)
    }

    async fn delete_tool(&self, name: &str) -> Result<bool, AgentError> {
        let conn = self.conn.lock().await;
        let keys: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT doc_key FROM catalogue_meta WHERE tool_name = ?1")
                .map_err(|e| AgentError::protocol(e.to_string()))?;
            let rows = stmt
                .query_map(params![name], |row| row.get::<_, String>(0))
                .map_err(|e| AgentError::protocol(e.to_string()))?;
            rows.filter_map(Result::ok).collect()
        };
        let removed = !keys.is_empty();
        for key in keys {
            conn.execute("DELETE FROM catalogue_meta WHERE doc_key = ?1", params![key])
                .map_err(|e| AgentError::protocol(e.to_string()))?;
            conn.execute(&format!("DELETE FROM {} WHERE doc_key = ?1", self.vec_table), params![key])
                .map_err(|e| AgentError::protocol(e.to_string()))?;
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
        let query_json = vector_to_json(&query_vec);

        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT m.origin_json FROM {} v JOIN catalogue_meta m ON m.doc_key = v.doc_key \
             WHERE v.embedding MATCH ?1 AND k = ?2 ORDER BY distance",
            self.vec_table
        );
        let mut stmt = conn.prepare(&sql).map_err(|e| AgentError::protocol(e.to_string()))?;
        let rows = stmt
            .query_map(params![query_json, limit as i64], |row| row.get::<_, String>(0))
            .map_err(|e| AgentError::protocol(e.to_string()))?;

        let mut origins = Vec::new();
        for row in rows {
            let json = row.map_err(|e| AgentError::protocol(e.to_string()))?;
            origins.push(serde_json::from_str::<ToolOrigin>(&json)?);
        }
        Ok(origins)
    }

    async fn list_tools(&self, limit: Option<usize>) -> Result<Vec<ToolDescriptor>, AgentError> {
        let conn = self.conn.lock().await;
        let sql = match limit {
            Some(n) => format!("SELECT origin_json FROM catalogue_meta LIMIT {n}"),
            None => "SELECT origin_json FROM catalogue_meta".to_string(),
        };
        let mut stmt = conn.prepare(&sql).map_err(|e| AgentError::protocol(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| AgentError::protocol(e.to_string()))?;

        let mut tools = Vec::new();
        for row in rows {
            let json = row.map_err(|e| AgentError::protocol(e.to_string()))?;
            let origin: ToolOrigin = serde_json::from_str(&json)?;
            tools.push(origin.tool);
        }
        Ok(tools)
    }
}
