use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a classified item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    User,
    Assistant,
}

/// Content classification of a single conversation event.
///
/// Tags are assigned by the classifier in rule order; every event gets
/// exactly one tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentTag {
    UserMessage,
    Error,
    ContextCondensation,
    NewInstructions,
    ToolCall,
    ToolResult,
    Completion,
}

/// Encoding of a tool result body, when the item is a `ToolResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    /// `[tool] Result: ...` bracket form
    Bracketed,
    /// Raw JSON object form (`{"tool": ...}` / `{"type": ...}`)
    Json,
}

/// One classified conversation event.
///
/// `original_index` ties the item back to exactly one source message or
/// UI event; it also breaks timestamp ties when a sequence is sorted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedItem {
    pub actor: Actor,
    pub tag: ContentTag,
    pub content: String,
    pub original_index: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    /// Line position in the source document (Markdown export path only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_kind: Option<ResultKind>,
}

impl ClassifiedItem {
    pub fn new(actor: Actor, tag: ContentTag, content: impl Into<String>, index: usize) -> Self {
        Self {
            actor,
            tag,
            content: content.into(),
            original_index: index,
            timestamp: None,
            line_number: None,
            tool_name: None,
            result_kind: None,
        }
    }

    /// Sort a sequence by timestamp, ties broken by original position.
    ///
    /// Items without timestamps keep their relative source order and sort
    /// before any timestamped item with the same original index range.
    pub fn sort_sequence(items: &mut [ClassifiedItem]) {
        items.sort_by(|a, b| match (a.timestamp, b.timestamp) {
            (Some(ta), Some(tb)) => ta
                .cmp(&tb)
                .then_with(|| a.original_index.cmp(&b.original_index)),
            _ => a.original_index.cmp(&b.original_index),
        });
    }
}
