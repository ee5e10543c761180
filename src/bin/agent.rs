//! `tidesmith`: the interactive REPL driving one agent over a
//! registry-gated tool population (§6).
//!
//! Usage: `tidesmith <registry-spec> [<server-spec> ...]`. Every initial
//! server spec is connected eagerly; everything discovered afterward via
//! `query-tools` is registered lazily and only actually connected on first
//! call.

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use tidesmith::agent_loop::{self, TurnOutcome};
use tidesmith::transport::McpPeer;
use tidesmith::{AgentConfig, AgentTrait, AnthropicAgent, Conversation, RegistryClient, Toolbox};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = AgentConfig::from_args_and_env()?;
    let pool = Arc::new(tidesmith::mcp_client::new_pool_with(
        config.pool_capacity,
        std::time::Duration::from_secs(config.pool_ttl_secs),
    ));

    let registry_peer: Arc<dyn McpPeer> = tidesmith::mcp_client::acquire(&pool, &config.registry).await?;
    let registry = Arc::new(RegistryClient::connect(registry_peer).await?);
    let toolbox = Arc::new(Toolbox::new(pool.clone(), registry));

    for server in &config.servers {
        match toolbox.connect_to_server(server.clone()).await {
            Ok(tools) => tracing::info!(server = server.url.as_str(), count = tools.len(), "connected"),
            Err(e) => eprintln!("error connecting to {}: {e}", server.url),
        }
    }

    let agent: Arc<dyn AgentTrait> = Arc::new(AnthropicAgent::new(config.anthropic_api_key, config.model_name, config.ant_version)?);

    let log_dir = std::env::var("CONVERSATION_LOG_DIR").unwrap_or_else(|_| "./logs".to_string());
    let log_dir = std::path::PathBuf::from(log_dir);

    let mut conversation = Conversation::new();
    let mut reader = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = match reader.next_line().await? {
            None => break,
            Some(s) if s.trim().is_empty() => continue,
            Some(s) if is_quit_command(&s) => break,
            Some(s) => s,
        };

        let outcome = agent_loop::run_turn(&mut conversation, &agent, &toolbox, &line).await;
        println!("{}", agent_loop::outcome_to_display(&outcome));
        if matches!(outcome, TurnOutcome::Exception(_)) {
            tracing::warn!("turn ended in an exception; conversation continues on the next line");
        }

        match tidesmith::conversation_log::write_turn(&log_dir, &conversation) {
            Ok(path) => tracing::debug!(path = %path.display(), "wrote conversation log"),
            Err(e) => tracing::warn!(error = %e, "failed to write conversation log"),
        }
    }

    pool.clear().await;
    println!("Bye.");
    Ok(())
}

fn is_quit_command(s: &str) -> bool {
    matches!(s.trim().to_lowercase().as_str(), "quit" | "exit" | "/quit")
}
