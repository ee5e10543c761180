//! # tidesmith
//!
//! An MCP client that mediates between a conversational agent and a
//! registry-gated population of tool servers. Tools are never connected to
//! upfront: the agent is offered a small, fixed surface of registry
//! meta-tools (`query-tools`, `list-tools`, `add-tool`, `add-server`,
//! `delete-tool`); discovering a tool through them registers it for lazy
//! connection, and connection to the underlying upstream server only
//! happens the first time the tool is actually called.
//!
//! ## Main modules
//!
//! - [`model`]: shared identity types — [`ServerDescriptor`], [`ToolDescriptor`], [`ToolOrigin`], the [`Embedder`] seam.
//! - [`transport`]: framed channels to one MCP peer — stdio, SSE, websocket — behind one [`McpPeer`] trait.
//! - [`mcp_client`]: [`McpClient`], the pooled connection type, plus the shared [`McpPool`].
//! - [`pool`]: the generic keyed, TTL'd, single-flight [`ConnectionPool`].
//! - [`catalogue`]: the Tool Catalogue's storage contract, [`InMemoryCatalogue`] and [`SqliteCatalogue`].
//! - [`registry_service`]: hosts a catalogue as an MCP server exposing the five meta-tools.
//! - [`registry_client`]: the Toolbox's adapter onto a connected Registry Service.
//! - [`toolbox`]: merges upstream and meta-tools into one dispatch surface ([`Toolbox`]).
//! - [`message`]: the conversation model — [`ContentBlock`], [`Conversation`], sentinel detection.
//! - [`agent`]: the vendor seam ([`Agent`] trait) and [`AnthropicAgent`].
//! - [`agent_loop`]: the bounded `run_turn` state machine driving one user turn.
//! - [`config`]: binds CLI args and environment variables once at startup.
//! - [`conversation_log`]: writes each turn's full conversation to a timestamped file.
//! - [`error`]: the shared [`AgentError`] taxonomy.

pub mod agent;
pub mod agent_loop;
pub mod catalogue;
pub mod config;
pub mod conversation_log;
pub mod error;
pub mod mcp_client;
pub mod message;
pub mod model;
pub mod pool;
pub mod registry_client;
pub mod registry_service;
pub mod toolbox;
pub mod transport;

pub use agent::{Agent as AgentTrait, AnthropicAgent};
pub use agent_loop::{run_turn, TurnOutcome};
pub use catalogue::{InMemoryCatalogue, SqliteCatalogue, ToolCatalogue};
pub use config::AgentConfig;
pub use error::AgentError;
pub use mcp_client::{McpClient, McpPool};
pub use message::{ContentBlock, Conversation, Message, Role};
pub use model::{Embedder, HashEmbedder, ServerDescriptor, ToolDescriptor, ToolOrigin};
pub use registry_client::RegistryClient;
pub use registry_service::RegistryService;
pub use toolbox::Toolbox;

/// Initializes tracing from `RUST_LOG` so unit tests across `src/**` can
/// print logs with `--nocapture`.
#[cfg(test)]
mod test_logging {
    use ctor::ctor;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::Layer;

    #[ctor]
    fn init() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_test_writer().with_filter(filter))
            .try_init();
    }
}
