//! Configuration: binds every environment variable and CLI argument once at
//! startup (§6, §9's design note — no ambient env reads inside the core).
//!
//! The CLI surface is `<binary> <registry-spec> [<server-spec> ...]`, where
//! both the registry and every initial server are `url::type` specs parsed
//! the same way (the registry is just another MCP peer reached over one of
//! the three transports).

use clap::Parser;

use crate::error::AgentError;
use crate::model::ServerDescriptor;

#[derive(Parser, Debug)]
#[command(name = "tidesmith", about = "An MCP client mediating between an agent and a registry-gated population of tool servers")]
struct Cli {
    /// `url::type` spec for the Registry Service (e.g. `tidesmith-registry::stdio`).
    registry_spec: String,

    /// `url::type` specs for servers to eagerly connect at startup.
    server_specs: Vec<String>,
}

pub struct AgentConfig {
    pub registry: ServerDescriptor,
    pub servers: Vec<ServerDescriptor>,
    pub anthropic_api_key: String,
    pub model_name: Option<String>,
    pub ant_version: Option<String>,
    pub pool_capacity: usize,
    pub pool_ttl_secs: u64,
}

impl AgentConfig {
    /// Parses CLI args and binds the environment once. A missing
    /// `ANTHROPIC_API_KEY` or a malformed spec is a configuration error
    /// (fatal at startup, §7), not something the running loop ever has to
    /// handle.
    pub fn from_args_and_env() -> Result<Self, AgentError> {
        let cli = Cli::parse();
        Self::from_parts(cli.registry_spec, cli.server_specs)
    }

    fn from_parts(registry_spec: String, server_specs: Vec<String>) -> Result<Self, AgentError> {
        let registry = ServerDescriptor::parse(&registry_spec)?;
        let servers = server_specs.iter().map(|s| ServerDescriptor::parse(s)).collect::<Result<Vec<_>, _>>()?;

        let anthropic_api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| AgentError::configuration("ANTHROPIC_API_KEY is not set"))?;
        let model_name = std::env::var("MODEL_NAME").ok();
        let ant_version = std::env::var("ANT_VERSION").ok();

        let pool_capacity = std::env::var("POOL_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(crate::pool::DEFAULT_CAPACITY);
        let pool_ttl_secs = std::env::var("POOL_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(crate::pool::DEFAULT_TTL.as_secs());

        Ok(Self {
            registry,
            servers,
            anthropic_api_key,
            model_name,
            ant_version,
            pool_capacity,
            pool_ttl_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: a malformed server spec (missing `::type`) is reported
    /// as a configuration error rather than panicking.
    #[test]
    fn malformed_server_spec_is_a_configuration_error() {
        std::env::set_var("ANTHROPIC_API_KEY", "test-key");
        let result = AgentConfig::from_parts("reg::stdio".to_string(), vec!["not-a-spec".to_string()]);
        assert!(matches!(result, Err(AgentError::Configuration(_))));
    }

    /// **Scenario**: valid registry and server specs parse into the
    /// expected transport kinds.
    #[test]
    fn valid_specs_parse_transports() {
        std::env::set_var("ANTHROPIC_API_KEY", "test-key");
        let config = AgentConfig::from_parts(
            "tidesmith-registry::stdio".to_string(),
            vec!["https://example.com/mcp::sse".to_string()],
        )
        .unwrap();
        assert_eq!(config.registry.transport, crate::transport::TransportKind::Stdio);
        assert_eq!(config.servers[0].transport, crate::transport::TransportKind::Sse);
    }
}
