//! Agent: the vendor-facing seam (§4.9).
//!
//! `Agent::chat` takes the conversation so far plus the currently available
//! tools and returns the new blocks a vendor's response translates into.
//! `AnthropicAgent` is the concrete implementation, built directly on
//! `reqwest` against the Messages API — there is no Rust SDK in this
//! dependency stack for Anthropic's wire format, so the client speaks it
//! the same way the MCP SSE transport speaks its own HTTP protocol: build
//! the request body by hand, POST, parse the JSON response.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::error::AgentError;
use crate::message::{detect_sentinel, sanitize_text, ContentBlock, Conversation, Role};
use crate::model::ToolDescriptor;

const DEFAULT_MODEL: &str = "claude-opus-4-5-20251101";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";

/// Vendor-agnostic chat seam: given the conversation so far and the tools
/// currently on offer, returns the new content blocks to append. Errors are
/// the caller's responsibility to turn into an `Exception` block — `Agent`
/// itself never inspects its own failure, only reports it.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn chat(&self, conversation: &Conversation, tools: &[ToolDescriptor]) -> Result<Vec<ContentBlock>, AgentError>;
}

/// Talks to Anthropic's Messages API. Reads `ANTHROPIC_API_KEY`,
/// `MODEL_NAME` (falls back to a fixed default), and `ANT_VERSION` (falls
/// back to a fixed default) once at construction — no ambient env reads
/// happen per call.
pub struct AnthropicAgent {
    client: Client,
    api_key: String,
    model: String,
    anthropic_version: String,
    system_prompt: Option<String>,
    max_tokens: u32,
}

impl AnthropicAgent {
    /// Builds a client from already-bound configuration values, so the
    /// process reads `ANTHROPIC_API_KEY`/`MODEL_NAME`/`ANT_VERSION` exactly
    /// once, at `AgentConfig` construction, rather than again here.
    pub fn new(api_key: impl Into<String>, model: Option<String>, anthropic_version: Option<String>) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| AgentError::transport(e.to_string()))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            anthropic_version: anthropic_version.unwrap_or_else(|| "2023-06-01".to_string()),
            system_prompt: None,
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }

    /// Convenience for tests and standalone use: reads env vars directly.
    pub fn from_env() -> Result<Self, AgentError> {
        let api_key = env::var("ANTHROPIC_API_KEY").map_err(|_| AgentError::configuration("ANTHROPIC_API_KEY is not set"))?;
        let model = env::var("MODEL_NAME").ok();
        let anthropic_version = env::var("ANT_VERSION").ok();
        Self::new(api_key, model, anthropic_version)
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn tools_to_request(tools: &[ToolDescriptor]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.input_schema,
                })
            })
            .collect()
    }

    fn conversation_to_request(conversation: &Conversation) -> Vec<Value> {
        conversation
            .messages
            .iter()
            .map(|message| {
                let role = match message.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                let content: Vec<Value> = message.content.iter().filter_map(block_to_request).collect();
                json!({ "role": role, "content": content })
            })
            .collect()
    }

    fn response_to_blocks(body: &Value) -> Result<Vec<ContentBlock>, AgentError> {
        let content = body
            .get("content")
            .and_then(|v| v.as_array())
            .ok_or_else(|| AgentError::vendor("missing content array in response"))?;

        let mut blocks = Vec::with_capacity(content.len());
        for item in content {
            let kind = item.get("type").and_then(|v| v.as_str()).unwrap_or_default();
            match kind {
                "text" => {
                    let text = item.get("text").and_then(|v| v.as_str()).unwrap_or_default();
                    blocks.push(detect_sentinel(&sanitize_text(text)));
                }
                "thinking" => {
                    let text = item.get("thinking").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                    let signature = item.get("signature").and_then(|v| v.as_str()).map(String::from);
                    blocks.push(ContentBlock::Thinking { signature, text });
                }
                "tool_use" => {
                    let id = item.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                    let name = item.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                    let args = item.get("input").cloned().unwrap_or(Value::Object(serde_json::Map::new()));
                    blocks.push(ContentBlock::ToolUse { id, name, args });
                }
                other => {
                    tracing::debug!(kind = other, "ignoring unsupported response content block");
                }
            }
        }
        Ok(blocks)
    }
}

fn block_to_request(block: &ContentBlock) -> Option<Value> {
    match block {
        ContentBlock::Text { text, .. } => Some(json!({ "type": "text", "text": text })),
        ContentBlock::Thinking { signature, text } => Some(json!({
            "type": "thinking",
            "thinking": text,
            "signature": signature,
        })),
        ContentBlock::ToolUse { id, name, args } => Some(json!({
            "type": "tool_use",
            "id": id,
            "name": name,
            "input": args,
        })),
        ContentBlock::ToolResult { tool_use_id, content, is_error } => Some(json!({
            "type": "tool_result",
            "tool_use_id": tool_use_id,
            "content": content,
            "is_error": is_error,
        })),
        // Terminal blocks are conversation bookkeeping, not vendor wire
        // content: a UserInput/FinalResponse/Exception is only ever
        // produced locally from an assistant Text block that already went
        // out in its raw form, so it never needs to be sent back.
        ContentBlock::UserInput { .. } | ContentBlock::FinalResponse { .. } | ContentBlock::Exception { .. } => None,
    }
}

#[async_trait]
impl Agent for AnthropicAgent {
    async fn chat(&self, conversation: &Conversation, tools: &[ToolDescriptor]) -> Result<Vec<ContentBlock>, AgentError> {
        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": Self::conversation_to_request(conversation),
        });
        if !tools.is_empty() {
            body["tools"] = json!(Self::tools_to_request(tools));
        }
        if let Some(system) = &self.system_prompt {
            body["system"] = json!(system);
        }

        let response = self
            .client
            .post(ANTHROPIC_MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.anthropic_version)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::vendor(e.to_string()))?;

        let status = response.status();
        let parsed: Value = response.json().await.map_err(|e| AgentError::vendor(e.to_string()))?;
        if !status.is_success() {
            let message = parsed
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error")
                .to_string();
            return Err(AgentError::vendor(format!("HTTP {status}: {message}")));
        }

        Self::response_to_blocks(&parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: a `tool_use` content block in a vendor response
    /// becomes a `ToolUse` block with the arguments carried through intact.
    #[test]
    fn response_to_blocks_extracts_tool_use() {
        let body = json!({
            "content": [
                { "type": "text", "text": "let me check that" },
                { "type": "tool_use", "id": "tu-1", "name": "weather", "input": { "city": "lisbon" } }
            ]
        });
        let blocks = AnthropicAgent::response_to_blocks(&body).unwrap();
        assert_eq!(blocks.len(), 2);
        match &blocks[1] {
            ContentBlock::ToolUse { name, args, .. } => {
                assert_eq!(name, "weather");
                assert_eq!(args["city"], "lisbon");
            }
            other => panic!("expected ToolUse, got {other:?}"),
        }
    }

    /// **Scenario**: a `FINAL_RESPONSE` sentinel embedded in response text
    /// is promoted to a typed terminal block by the same path plain text
    /// takes.
    #[test]
    fn response_to_blocks_detects_final_response() {
        let body = json!({
            "content": [{ "type": "text", "text": "FINAL_RESPONSE: it is sunny" }]
        });
        let blocks = AnthropicAgent::response_to_blocks(&body).unwrap();
        assert!(matches!(blocks[0], ContentBlock::FinalResponse { .. }));
    }

    /// **Scenario**: a `ToolResult` block serializes with `tool_use_id` and
    /// `is_error` so Anthropic can match it back to its `tool_use`.
    #[test]
    fn tool_result_block_round_trips_to_request_shape() {
        let block = ContentBlock::ToolResult {
            tool_use_id: "tu-1".to_string(),
            content: "72F and sunny".to_string(),
            is_error: false,
        };
        let value = block_to_request(&block).unwrap();
        assert_eq!(value["type"], "tool_result");
        assert_eq!(value["tool_use_id"], "tu-1");
        assert_eq!(value["is_error"], false);
    }
}
