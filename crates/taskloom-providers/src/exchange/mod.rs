mod parser;
mod schema;

pub use parser::{parse_exchange_file, parse_exchange_str};

use chrono::{DateTime, Utc};

/// Role tag on an agent-exchange message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Other,
}

impl MessageRole {
    pub(crate) fn from_str(role: &str) -> Self {
        match role.to_ascii_lowercase().as_str() {
            "user" => MessageRole::User,
            "assistant" => MessageRole::Assistant,
            "system" => MessageRole::System,
            _ => MessageRole::Other,
        }
    }
}

/// A tool-use part, kept with its payload so downstream consumers can
/// mine file paths out of it.
#[derive(Debug, Clone)]
pub struct ToolUseRef {
    pub name: String,
    pub input: serde_json::Value,
}

/// One normalised agent-exchange message.
///
/// `text` is the space-joined concatenation of the message's text parts
/// (or the whole body when content is a plain string). Tool parts are
/// carried alongside rather than flattened into the text.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub role: MessageRole,
    pub text: String,
    pub tool_uses: Vec<ToolUseRef>,
    /// Tool names referenced by tool_result parts, where recoverable.
    pub tool_results: Vec<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub index: usize,
}
