//! Stdio transport: spawns a child process and speaks MCP over its stdin/stdout.
//!
//! Chooses an interpreter implicitly via the command the caller supplies
//! (e.g. `uv run ...`, `node ...`); resolving a script's interpreter from its
//! extension is the caller's concern (see `config::ServerDescriptor`), this
//! module only owns the spawned transport and the initialize handshake.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use mcp_client::stdio::{
    JsonRpcMessage, StdioClientTransport, StdioClientTransportError, StdioServerParameters,
    StdioStream,
};
use mcp_core::{MessageId, NotificationMessage, RequestMessage, ResultMessage};
use serde_json::{json, Value};

use crate::error::AgentError;

use super::{parse_call_tool_result, parse_list_tools_result, McpPeer, ToolCallContent, ToolSpec};

const PROTOCOL_VERSION: &str = "2025-11-25";
const INITIALIZE_REQUEST_ID: &str = "tidesmith-initialize";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One spawned MCP server process and the initialize handshake already
/// completed against it.
pub struct StdioSession {
    transport: StdioClientTransport,
    receiver: mpsc::Receiver<JsonRpcMessage>,
}

#[derive(Debug, thiserror::Error)]
pub enum StdioSessionError {
    #[error("transport: {0}")]
    Transport(#[from] StdioClientTransportError),
    #[error("initialize: {0}")]
    Initialize(String),
}

impl StdioSession {
    /// Spawns `command args...` and performs the initialize handshake.
    /// `env` is inherited by the child in addition to the default
    /// environment; pass `None` when the server needs nothing extra.
    pub fn new(
        command: impl Into<String>,
        args: Vec<String>,
        env: Option<Vec<(String, String)>>,
        stderr_verbose: bool,
    ) -> Result<Self, StdioSessionError> {
        let (tx, rx) = mpsc::channel();

        let stderr_stream = if stderr_verbose {
            StdioStream::Inherit
        } else {
            StdioStream::Null
        };
        let mut params = StdioServerParameters::new(command)
            .args(args)
            .stderr(stderr_stream);
        if let Some(env_pairs) = env {
            params = params.env(env_pairs);
        }

        let mut transport = StdioClientTransport::new(params);
        transport.on_message(move |msg| {
            let _ = tx.send(msg);
        });
        transport.on_error(|e| {
            tracing::warn!("stdio transport error: {e}");
        });
        transport.start()?;

        let mut session = Self {
            transport,
            receiver: rx,
        };
        session.initialize()?;
        Ok(session)
    }

    fn initialize(&mut self) -> Result<(), StdioSessionError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "clientInfo": {
                "name": "tidesmith",
                "version": env!("CARGO_PKG_VERSION"),
            }
        });
        self.send_request(INITIALIZE_REQUEST_ID, "initialize", params)?;

        match self.wait_for_result(INITIALIZE_REQUEST_ID, Duration::from_secs(20))? {
            Some(result) => {
                if let Some(err) = result.error {
                    return Err(StdioSessionError::Initialize(err.message));
                }
                let notification = JsonRpcMessage::Notification(NotificationMessage::new(
                    "notifications/initialized",
                    Some(json!({})),
                ));
                self.transport.send(&notification)?;
                Ok(())
            }
            None => Err(StdioSessionError::Initialize(
                "timeout waiting for initialize".into(),
            )),
        }
    }

    fn send_request(&mut self, id: &str, method: &str, params: Value) -> Result<(), StdioSessionError> {
        let request = RequestMessage::new(id, method, params);
        self.transport
            .send(&JsonRpcMessage::Request(request))
            .map_err(StdioSessionError::Transport)
    }

    fn wait_for_result(
        &mut self,
        request_id: &str,
        timeout: Duration,
    ) -> Result<Option<ResultMessage>, StdioSessionError> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            let remaining = deadline
                .saturating_duration_since(Instant::now())
                .min(Duration::from_secs(1));
            match self.receiver.recv_timeout(remaining) {
                Ok(JsonRpcMessage::Result(msg)) if message_id_matches(&msg.id, request_id) => {
                    return Ok(Some(msg));
                }
                Ok(JsonRpcMessage::Request(req)) if req.method == "roots/list" => {
                    let result = ResultMessage::success(req.id.clone(), json!({ "roots": [] }));
                    self.transport.send(&JsonRpcMessage::Result(result))?;
                }
                Ok(_) => {}
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        Ok(None)
    }

    fn request(&mut self, id: &str, method: &str, params: Value) -> Result<ResultMessage, AgentError> {
        self.send_request(id, method, params)
            .map_err(|e| AgentError::transport(e.to_string()))?;
        self.wait_for_result(id, REQUEST_TIMEOUT)
            .map_err(|e| AgentError::transport(e.to_string()))?
            .ok_or_else(|| AgentError::transport(format!("timeout waiting for {method}")))
    }
}

fn message_id_matches(id: &MessageId, expected: &str) -> bool {
    id.as_str() == Some(expected)
}

/// Blocking stdio calls are run via `block_in_place` so the session can be
/// driven from an async context without a dedicated worker thread.
#[async_trait::async_trait]
impl McpPeer for std::sync::Mutex<StdioSession> {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, AgentError> {
        tokio::task::block_in_place(|| {
            let mut session = self.lock().expect("stdio session mutex poisoned");
            let result = session.request(
                "tidesmith-tools-list",
                "tools/list",
                Value::Object(serde_json::Map::new()),
            )?;
            if let Some(err) = result.error {
                return Err(AgentError::protocol(err.message));
            }
            parse_list_tools_result(result.result.unwrap_or(Value::Null))
        })
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallContent, AgentError> {
        tokio::task::block_in_place(|| {
            let mut session = self.lock().expect("stdio session mutex poisoned");
            let id = format!("tidesmith-call-{name}");
            let params = json!({ "name": name, "arguments": arguments });
            let result = session.request(&id, "tools/call", params)?;
            if let Some(err) = result.error {
                return Err(AgentError::protocol(err.message));
            }
            parse_call_tool_result(result.result.unwrap_or(Value::Null))
        })
    }
}
