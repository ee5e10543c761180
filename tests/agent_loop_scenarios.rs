//! End-to-end coverage of the Agent Loop driving a real `Toolbox` over an
//! in-process Registry Service: no subprocess, SSE, or websocket transport
//! is involved, since the registry connection only needs the `McpPeer`
//! trait — the pieces actually under test (depth control, sentinel
//! detection, registry dispatch, lazy registration) don't depend on which
//! transport eventually reaches a real upstream server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use tidesmith::catalogue::{InMemoryCatalogue, ToolCatalogue};
use tidesmith::model::{HashEmbedder, ServerDescriptor, ToolDescriptor, ToolOrigin};
use tidesmith::transport::{McpPeer, ToolCallContent, ToolSpec, TransportKind};
use tidesmith::{agent_loop, mcp_client, AgentError, AgentTrait, Conversation, ContentBlock, RegistryClient, RegistryService, Toolbox};

/// Wraps an in-process `RegistryService` behind `McpPeer` so a `RegistryClient`
/// can be built without dialing a real transport.
struct InProcessRegistryPeer {
    service: RegistryService,
}

#[async_trait]
impl McpPeer for InProcessRegistryPeer {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, AgentError> {
        Ok(self.service.list_tool_specs())
    }

    async fn call_tool(&self, name: &str, arguments: serde_json::Value) -> Result<ToolCallContent, AgentError> {
        Ok(self.service.call(name, arguments).await)
    }
}

async fn toolbox_with_empty_registry() -> Arc<Toolbox> {
    let catalogue = Arc::new(InMemoryCatalogue::new(Arc::new(HashEmbedder::default()), Arc::new(mcp_client::new_pool())));
    let peer: Arc<dyn McpPeer> = Arc::new(InProcessRegistryPeer { service: RegistryService::new(catalogue) });
    let registry = Arc::new(RegistryClient::connect(peer).await.unwrap());
    Arc::new(Toolbox::new(Arc::new(mcp_client::new_pool()), registry))
}

struct ScriptedAgent {
    responses: std::sync::Mutex<std::vec::IntoIter<Vec<ContentBlock>>>,
    calls: AtomicUsize,
}

impl ScriptedAgent {
    fn new(responses: Vec<Vec<ContentBlock>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into_iter()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AgentTrait for ScriptedAgent {
    async fn chat(&self, _conversation: &Conversation, _tools: &[ToolDescriptor]) -> Result<Vec<ContentBlock>, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.responses.lock().unwrap().next().unwrap_or_default())
    }
}

/// S1: an empty registry and a model that answers `FINAL_RESPONSE` on the
/// first call ends the turn immediately with no tool dispatch.
#[tokio::test]
async fn empty_registry_final_response_shortcut() {
    let toolbox = toolbox_with_empty_registry().await;
    let agent: Arc<dyn AgentTrait> = Arc::new(ScriptedAgent::new(vec![vec![ContentBlock::FinalResponse {
        response: "Please give me a task.".to_string(),
    }]]));

    let mut conversation = Conversation::new();
    let outcome = agent_loop::run_turn(&mut conversation, &agent, &toolbox, "hello").await;

    assert!(matches!(outcome, agent_loop::TurnOutcome::Final(ref r) if r == "Please give me a task."));
    // user message + flushed assistant message, no tool-result message.
    assert_eq!(conversation.messages.len(), 2);
}

/// S2 (registry half): a `query-tools` call against a seeded registry
/// returns one origin, which the Toolbox auto-registers; a second model
/// call against the now-larger tool list produces the final answer.
#[tokio::test]
async fn query_tools_then_final_response() {
    let pool = Arc::new(mcp_client::new_pool());
    let catalogue: Arc<dyn ToolCatalogue> = Arc::new(InMemoryCatalogue::new(Arc::new(HashEmbedder::default()), pool.clone()));
    let weather_server = ServerDescriptor::new("weather-proc", TransportKind::Stdio, None);
    catalogue
        .add_tool(
            ToolDescriptor {
                name: "weather".to_string(),
                description: "current weather for a city".to_string(),
                input_schema: json!({"type": "object", "properties": {"city": {"type": "string"}}}),
            },
            weather_server.clone(),
        )
        .await
        .unwrap();

    let peer: Arc<dyn McpPeer> = Arc::new(InProcessRegistryPeer { service: RegistryService::new(catalogue) });
    let registry = Arc::new(RegistryClient::connect(peer).await.unwrap());
    let toolbox = Arc::new(Toolbox::new(Arc::new(mcp_client::new_pool()), registry));

    let agent: Arc<dyn AgentTrait> = Arc::new(ScriptedAgent::new(vec![
        vec![ContentBlock::ToolUse {
            id: "tu-1".to_string(),
            name: "query-tools".to_string(),
            args: json!({"query": "weather"}),
        }],
        vec![ContentBlock::FinalResponse { response: "found it".to_string() }],
    ]));

    let mut conversation = Conversation::new();
    let outcome = agent_loop::run_turn(&mut conversation, &agent, &toolbox, "weather in Paris").await;
    assert!(matches!(outcome, agent_loop::TurnOutcome::Final(ref r) if r == "found it"));

    let tools = toolbox.available_tools().await;
    assert!(tools.iter().any(|t| t.name == "weather"));

    let tool_result_text = conversation
        .messages
        .iter()
        .flat_map(|m| m.content.iter())
        .find_map(|b| match b {
            ContentBlock::ToolResult { content, .. } => Some(content.clone()),
            _ => None,
        })
        .expect("query-tools dispatch produced a ToolResult block");
    assert!(tool_result_text.contains("successfully queried and added weather"));
}

/// Lazy registration drops a duplicate name silently rather than rejecting
/// the whole batch, since an overlapping `query-tools` result set is an
/// expected, non-exceptional event — the documented contrast with
/// `connect_to_server`'s atomic-reject on a genuine origin conflict.
#[tokio::test]
async fn lazy_registration_drops_duplicate_names() {
    let toolbox = toolbox_with_empty_registry().await;
    let server_a = ServerDescriptor::new("a", TransportKind::Stdio, None);
    let server_b = ServerDescriptor::new("b", TransportKind::Stdio, None);
    let tool = ToolDescriptor {
        name: "search".to_string(),
        description: "search the web".to_string(),
        input_schema: json!({}),
    };

    let added_first = toolbox.register_tools(vec![ToolOrigin { tool: tool.clone(), server: server_a }]).await;
    let added_second = toolbox.register_tools(vec![ToolOrigin { tool, server: server_b }]).await;

    assert_eq!(added_first, vec!["search".to_string()]);
    assert!(added_second.is_empty());
    let tools = toolbox.available_tools().await;
    assert_eq!(tools.iter().filter(|t| t.name == "search").count(), 1);
}

/// Guards `MAX_RECURSION_DEPTH` mutation: it's process-global, and other
/// tests in this file read it indirectly through `run_turn`'s default.
static DEPTH_ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// S5: a model that never emits a terminal block exhausts the depth cap
/// and the loop still returns instead of recursing forever.
#[tokio::test]
async fn depth_cap_terminates_a_runaway_model() {
    let _guard = DEPTH_ENV_LOCK.lock().unwrap();
    std::env::set_var("MAX_RECURSION_DEPTH", "3");
    let toolbox = toolbox_with_empty_registry().await;
    let agent: Arc<dyn AgentTrait> = Arc::new(ScriptedAgent::new(vec![
        vec![ContentBlock::ToolUse { id: "1".to_string(), name: "query-tools".to_string(), args: json!({"query": "x"}) }],
        vec![ContentBlock::ToolUse { id: "2".to_string(), name: "query-tools".to_string(), args: json!({"query": "x"}) }],
        vec![ContentBlock::ToolUse { id: "3".to_string(), name: "query-tools".to_string(), args: json!({"query": "x"}) }],
    ]));

    let mut conversation = Conversation::new();
    let outcome = agent_loop::run_turn(&mut conversation, &agent, &toolbox, "keep trying").await;
    assert!(matches!(outcome, agent_loop::TurnOutcome::DepthExhausted));
    std::env::remove_var("MAX_RECURSION_DEPTH");

    let last = conversation.messages.last().expect("diagnostic message flushed");
    let diagnostic_text = last
        .content
        .iter()
        .find_map(|b| match b {
            ContentBlock::Text { text, .. } => Some(text.clone()),
            _ => None,
        })
        .expect("depth cap flushes a diagnostic Text block");
    assert!(diagnostic_text.contains("Maximum re-evaluation depth"));
}

/// A model response with no `ToolUse` and no terminal sentinel is plain
/// text: the turn loops back to another model call instead of ending, and
/// only the model's eventual `FinalResponse` closes it out.
#[tokio::test]
async fn plain_text_response_loops_back_to_model_call() {
    let toolbox = toolbox_with_empty_registry().await;
    let agent: Arc<dyn AgentTrait> = Arc::new(ScriptedAgent::new(vec![
        vec![ContentBlock::text("thinking out loud")],
        vec![ContentBlock::text("still thinking")],
        vec![ContentBlock::FinalResponse { response: "done thinking".to_string() }],
    ]));

    let mut conversation = Conversation::new();
    let outcome = agent_loop::run_turn(&mut conversation, &agent, &toolbox, "ponder this").await;
    assert!(matches!(outcome, agent_loop::TurnOutcome::Final(ref r) if r == "done thinking"));
}
