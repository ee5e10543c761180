//! Error taxonomy shared across transport, pool, catalogue, toolbox and loop.
//!
//! Kinds map directly to the error handling design: transport errors leave a
//! pooled client discarded, protocol errors become an error-flagged
//! `ToolResult` rather than aborting a turn, registration conflicts reject a
//! whole batch atomically, and configuration errors are fatal at startup.

use thiserror::Error;

/// Errors that can surface anywhere in the agent pipeline.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Connect/send/receive failure on a `Transport`. The pooled client for
    /// the offending key is discarded; a later `acquire` recreates it.
    #[error("transport: {0}")]
    Transport(String),

    /// Malformed MCP message, unknown tool, or schema violation reported by
    /// the upstream server. Non-fatal to the turn.
    #[error("protocol: {0}")]
    Protocol(String),

    /// A tool-name collision between two different origins. Carries every
    /// offending name so the whole batch can be reported and rejected
    /// atomically.
    #[error("registration conflict: {0}")]
    Registration(String),

    /// Missing environment variable or malformed CLI argument. Fatal at
    /// startup.
    #[error("configuration: {0}")]
    Configuration(String),

    /// The Agent's vendor call failed (network, auth, malformed response).
    #[error("agent call failed: {0}")]
    Vendor(String),

    /// JSON (de)serialization failure outside the MCP wire layer.
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AgentError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn registration(msg: impl Into<String>) -> Self {
        Self::Registration(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn vendor(msg: impl Into<String>) -> Self {
        Self::Vendor(msg.into())
    }
}
