//! Conversation Model: the vendor-neutral shape an `Agent` and the
//! `AgentLoop` exchange (§3, §4.4).
//!
//! A `Conversation` is an ordered list of `Message`s; each carries a role
//! and one or more `ContentBlock`s. Blocks are a tagged sum rather than one
//! "text" type so a sentinel (`NEED_USER_INPUT` / `FINAL_RESPONSE`) found in
//! an assistant's raw text can be promoted into its own typed block before
//! the loop ever sees the underlying string.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Who produced a `Message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn user(content: Vec<ContentBlock>) -> Self {
        Self { role: Role::User, content }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self { role: Role::Assistant, content }
    }
}

/// One unit of message content. Variants beyond plain text exist so the
/// loop can pattern-match on intent (a tool call, a request for user input,
/// a terminal answer) instead of re-parsing strings at every hop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ContentBlock {
    /// Plain text. `user_facing` distinguishes text meant for the REPL's
    /// stdout projection from internal scratch text that only exists for
    /// the transcript.
    Text { text: String, user_facing: bool },

    /// Extended reasoning some vendors stream back alongside a response.
    /// Carried through transcripts unexamined; never inspected for
    /// sentinels.
    Thinking { signature: Option<String>, text: String },

    /// A tool invocation the Agent wants performed.
    ToolUse { id: String, name: String, args: serde_json::Value },

    /// The outcome of one `ToolUse`, matched back to it by `tool_use_id`.
    ToolResult { tool_use_id: String, content: String, is_error: bool },

    /// An assistant turn that ends in a request for more input from the
    /// human, detected via the `NEED_USER_INPUT` sentinel.
    UserInput { request: String },

    /// An assistant turn that ends the loop with a terminal answer,
    /// detected via the `FINAL_RESPONSE` sentinel.
    FinalResponse { response: String },

    /// A caught failure surfaced as conversation content rather than a
    /// propagated error, so a transcript shows exactly where and why a
    /// turn aborted.
    Exception { message: String },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into(), user_facing: true }
    }

    /// True for the three block kinds that end an `AgentLoop` turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ContentBlock::UserInput { .. } | ContentBlock::FinalResponse { .. } | ContentBlock::Exception { .. })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn push_blocks(&mut self, role: Role, content: Vec<ContentBlock>) {
        self.messages.push(Message { role, content });
    }

    /// Every `ContentBlock` across every message, in order — the flat view
    /// an `Agent` translates to a vendor's wire format.
    pub fn blocks(&self) -> impl Iterator<Item = &ContentBlock> {
        self.messages.iter().flat_map(|m| m.content.iter())
    }
}

static NEED_USER_INPUT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)NEED_USER_INPUT:?\s*(.*?)\s*(?:\n\s*\n|$)").unwrap());
static FINAL_RESPONSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)FINAL_RESPONSE:?\s*(.*?)\s*(?:\n\s*\n|$)").unwrap());

/// Scans raw assistant text for a sentinel marker and, if found, returns the
/// typed terminal block it denotes instead of a plain `Text` block.
/// `FINAL_RESPONSE` takes priority when both markers somehow appear, since a
/// final answer should never be mistaken for a request to keep waiting.
pub fn detect_sentinel(raw: &str) -> ContentBlock {
    if let Some(caps) = FINAL_RESPONSE.captures(raw) {
        return ContentBlock::FinalResponse { response: caps[1].trim().to_string() };
    }
    if let Some(caps) = NEED_USER_INPUT.captures(raw) {
        return ContentBlock::UserInput { request: caps[1].trim().to_string() };
    }
    ContentBlock::text(raw.trim())
}

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[a-zA-Z][^>]*>").unwrap());
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Lightweight cleanup pass applied to text the Agent returns before it
/// reaches a transcript or the REPL: strips stray HTML tags, unescapes the
/// common JSON escape artifacts a vendor's wire format occasionally leaks
/// into plain text, and collapses excess whitespace. Text under a small
/// size with nothing that looks like a tag or escape is returned unchanged.
pub fn sanitize_text(raw: &str) -> String {
    let looks_suspicious = raw.contains('<') || raw.contains("\\n") || raw.contains("\\\"");
    if raw.len() < 40 && !looks_suspicious {
        return raw.to_string();
    }
    let without_tags = HTML_TAG.replace_all(raw, "");
    let unescaped = without_tags.replace("\\n", "\n").replace("\\\"", "\"").replace("\\t", "\t");
    let collapsed_spaces = WHITESPACE_RUN.replace_all(&unescaped, " ");
    let collapsed_blank_lines = BLANK_LINES.replace_all(&collapsed_spaces, "\n\n");
    collapsed_blank_lines.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: a `FINAL_RESPONSE` sentinel is promoted to a typed
    /// terminal block and the marker itself is not echoed back.
    #[test]
    fn detects_final_response_sentinel() {
        let block = detect_sentinel("FINAL_RESPONSE: the answer is 42\n\ntrailing notes");
        match block {
            ContentBlock::FinalResponse { response } => assert_eq!(response, "the answer is 42"),
            other => panic!("expected FinalResponse, got {other:?}"),
        }
    }

    /// **Scenario**: a `NEED_USER_INPUT` sentinel is promoted when no
    /// `FINAL_RESPONSE` marker is present.
    #[test]
    fn detects_need_user_input_sentinel() {
        let block = detect_sentinel("NEED_USER_INPUT: which city?");
        match block {
            ContentBlock::UserInput { request } => assert_eq!(request, "which city?"),
            other => panic!("expected UserInput, got {other:?}"),
        }
    }

    /// **Scenario**: when both markers appear, `FINAL_RESPONSE` wins so a
    /// terminal answer is never mistaken for a pending question.
    #[test]
    fn final_response_takes_priority_over_need_user_input() {
        let block = detect_sentinel("NEED_USER_INPUT: ignored\n\nFINAL_RESPONSE: done");
        assert!(matches!(block, ContentBlock::FinalResponse { .. }));
    }

    /// **Scenario**: plain text with no sentinel passes through as a `Text`
    /// block.
    #[test]
    fn plain_text_has_no_sentinel() {
        let block = detect_sentinel("just a regular reply");
        match block {
            ContentBlock::Text { text, user_facing } => {
                assert_eq!(text, "just a regular reply");
                assert!(user_facing);
            }
            other => panic!("expected Text, got {other:?}"),
        }
    }

    /// **Scenario**: short, unsuspicious text is left untouched so the
    /// hygiene pass doesn't rewrite ordinary replies.
    #[test]
    fn short_plain_text_is_unchanged() {
        assert_eq!(sanitize_text("hello there"), "hello there");
    }

    /// **Scenario**: stray HTML tags and JSON escape artifacts are cleaned
    /// out of longer text.
    #[test]
    fn sanitizes_tags_and_escapes() {
        let dirty = "<p>result:\\n  value   is   here</p>\n\n\n\nmore text after excess blank lines to push length past threshold";
        let clean = sanitize_text(dirty);
        assert!(!clean.contains('<'));
        assert!(!clean.contains("\\n"));
        assert!(!clean.contains("   "));
        assert!(!clean.contains("\n\n\n"));
    }
}
