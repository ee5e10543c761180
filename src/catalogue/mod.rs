//! Tool Catalogue: the Registry's storage core.
//!
//! A mapping from compound key `(server.id, tool.name)` to `ToolOrigin`, plus
//! a similarity index over `"{name}: {description}"` keyed by tool name.
//! Storage is pluggable: [`InMemoryCatalogue`] keeps everything in process;
//! [`SqliteCatalogue`] persists each origin under `"{server.url}-{tool.name}"`
//! in a sqlite-vec-backed table that also carries the embedding for search.

mod in_memory;
mod sqlite;

pub use in_memory::InMemoryCatalogue;
pub use sqlite::SqliteCatalogue;

pub use crate::model::{ConnectionKey, Embedder, HashEmbedder, ServerDescriptor, ToolDescriptor, ToolOrigin};

use async_trait::async_trait;

use crate::error::AgentError;

/// The Tool Catalogue's storage contract (§4.5). Writers (`add_tool`,
/// `delete_tool`, `add_server`) are expected to run under an exclusive
/// lock at the call site; readers (`query_tools`, `list_tools`) under a
/// shared one — see `Toolbox`/`RegistryService` for the locking discipline.
#[async_trait]
pub trait ToolCatalogue: Send + Sync {
    /// Connects to `server` via the pool, lists its tools, and `add_tool`s
    /// each. The server is recorded even if an individual `add_tool` fails;
    /// the error is still surfaced to the caller.
    async fn add_server(&self, server: ServerDescriptor) -> Result<Vec<ToolOrigin>, AgentError>;

    /// Upserts on `(server.id, tool.name)` and (re)indexes the entry.
    async fn add_tool(&self, tool: ToolDescriptor, server: ServerDescriptor) -> Result<ToolOrigin, AgentError>;

    /// Removes the named tool and rebuilds the similarity index without it.
    /// Returns `true` if a tool was actually removed.
    async fn delete_tool(&self, name: &str) -> Result<bool, AgentError>;

    /// Similarity search against the index; returns up to `limit` origins
    /// (default 10).
    async fn query_tools(&self, query: &str, limit: Option<usize>) -> Result<Vec<ToolOrigin>, AgentError>;

    /// Enumerates all known tools, optionally capped at `limit`.
    async fn list_tools(&self, limit: Option<usize>) -> Result<Vec<ToolDescriptor>, AgentError>;
}

/// Default result cap for `query_tools` when the caller passes `None`.
pub const DEFAULT_QUERY_LIMIT: usize = 10;
