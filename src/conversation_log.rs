//! Conversation log: every turn writes the full conversation, verbatim, to
//! its own timestamped file (§6) — independent of the compact projection the
//! REPL prints to standard output, which only ever shows user-facing text,
//! the final response, or an exception message.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::AgentError;
use crate::message::Conversation;

/// Serializes `conversation` and writes it to `log_dir/turn-<timestamp>.json`,
/// creating `log_dir` if it does not exist yet. Returns the path written so
/// the caller can mention it at the `debug` level.
pub fn write_turn(log_dir: &Path, conversation: &Conversation) -> Result<PathBuf, AgentError> {
    std::fs::create_dir_all(log_dir).map_err(|e| AgentError::transport(e.to_string()))?;
    let path = log_dir.join(format!("turn-{}.json", Utc::now().format("%Y%m%dT%H%M%S%.3f")));
    let json = serde_json::to_string_pretty(conversation).map_err(|e| AgentError::protocol(e.to_string()))?;
    std::fs::write(&path, json).map_err(|e| AgentError::transport(e.to_string()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ContentBlock, Message};

    /// **Scenario**: a turn's conversation round-trips through the written
    /// file as valid JSON containing every message.
    #[test]
    fn writes_a_readable_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut conversation = Conversation::new();
        conversation.push(Message::user(vec![ContentBlock::text("weather in Paris")]));
        conversation.push(Message::assistant(vec![ContentBlock::FinalResponse { response: "18C".to_string() }]));

        let path = write_turn(dir.path(), &conversation).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        let round_tripped: Conversation = serde_json::from_str(&contents).unwrap();
        assert_eq!(round_tripped.messages.len(), 2);
    }
}
