//! Shared data model: server/tool identity, origins, and the embedding seam.
//!
//! Lives below both `catalogue` and `mcp_client` so neither has to depend on
//! the other for these plain value types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::transport::TransportKind;

/// An origin server a tool may be advertised from. Identity is
/// `url ∥ "::" ∥ transport`; immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub url: String,
    pub transport: TransportKind,
    pub auth_token: Option<String>,
}

impl ServerDescriptor {
    pub fn new(url: impl Into<String>, transport: TransportKind, auth_token: Option<String>) -> Self {
        Self {
            url: url.into(),
            transport,
            auth_token,
        }
    }

    /// Identity string used to key the Connection Pool and the Catalogue.
    pub fn id(&self) -> String {
        format!("{}::{}", self.url, self.transport)
    }

    /// Parses a CLI server spec of the form `url::type`.
    pub fn parse(spec: &str) -> Result<Self, AgentError> {
        let (url, kind) = spec.rsplit_once("::").ok_or_else(|| {
            AgentError::configuration(format!("malformed server spec '{spec}' (expected url::type)"))
        })?;
        let transport: TransportKind = kind.parse()?;
        Ok(Self::new(url, transport, None))
    }
}

/// Same identity shape as `ServerDescriptor`; keys the Connection Pool.
pub type ConnectionKey = String;

/// A tool's name, description, and JSON-Schema input shape. Value type with
/// no identity beyond `name`; uniqueness is enforced by the Toolbox, not
/// here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// A tool paired with the server it was advertised from. Produced by the
/// Registry's similarity search; consumed by the Toolbox to register tools
/// for lazy connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOrigin {
    pub tool: ToolDescriptor,
    pub server: ServerDescriptor,
}

impl ToolOrigin {
    /// The compound key this origin is upserted under: `(server.id, tool.name)`.
    pub fn key(&self) -> (String, String) {
        (self.server.id(), self.tool.name.clone())
    }
}

/// Produces a fixed-size embedding for text. The embedding provider itself
/// is an external collaborator (§1); this trait is the seam a real provider
/// plugs into, and `HashEmbedder` is a deterministic stand-in for tests and
/// for environments with no configured provider.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, AgentError>;
    fn dimension(&self) -> usize;
}

/// Deterministic bag-of-words hash embedding. Not semantically meaningful,
/// but exercises the full similarity-search path without a network call.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, AgentError> {
        Ok(texts.iter().map(|t| hash_embed(t, self.dimension)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn hash_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut vector = vec![0f32; dimension];
    for token in text.split_whitespace() {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        std::hash::Hash::hash(&token.to_lowercase(), &mut hasher);
        let bucket = (std::hash::Hasher::finish(&hasher) as usize) % dimension;
        vector[bucket] += 1.0;
    }
    vector
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
