use serde::Deserialize;
use serde_json::Value;

/// Agent-exchange logs come in two encodings: a bare message array, or
/// an object wrapping the array in a `messages` field. Records stay raw
/// here so one malformed message degrades alone.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ExchangeLog {
    Flat(Vec<Value>),
    Wrapped { messages: Vec<Value> },
}

impl ExchangeLog {
    pub(crate) fn into_messages(self) -> Vec<Value> {
        match self {
            ExchangeLog::Flat(messages) => messages,
            ExchangeLog::Wrapped { messages } => messages,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<RawContent>,
    /// ISO-8601 string or epoch milliseconds; both occur.
    #[serde(default, alias = "ts")]
    pub timestamp: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawContent {
    Text(String),
    Parts(Vec<RawPart>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub(crate) enum RawPart {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    ToolUse {
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        #[serde(default)]
        tool_use_id: Option<String>,
        #[serde(default)]
        content: Option<Value>,
    },
    #[serde(other)]
    Unknown,
}
