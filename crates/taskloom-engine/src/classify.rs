use once_cell::sync::Lazy;
use regex::Regex;

use taskloom_providers::{
    MessageEvent, MessageRole, TranscriptSection, UiEvent, UiEventKind,
};
use taskloom_types::{Actor, ClassifiedItem, ContentTag, ResultKind};

// Rule 1: tool result in bracket form, `[read_file] Result: ...`
static BRACKET_RESULT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\[([A-Za-z0-9_\-]+)\]\s*Result:").unwrap());

// Rule 1 (alternate encoding): raw JSON object with a tool/type key
static JSON_RESULT: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^\{\s*"(tool|type)"\s*:"#).unwrap());

// Rule 3: condensed-history preamble, starred or not
static CONDENSATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^1\.\s*(\*\*)?previous conversation\s*:?").unwrap());

const ERROR_PREFIX: &str = "[ERROR]";
const NEW_INSTRUCTIONS_PREFIX: &str = "new instructions for task continuation:";
const COMPLETION_MARKER: &str = "<attempt_completion>";

/// Outcome of classifying one event body.
#[derive(Debug, Clone)]
pub struct Classification {
    pub tag: ContentTag,
    pub tool_name: Option<String>,
    pub result_kind: Option<ResultKind>,
    /// For `NewInstructions`, the instruction body after the prefix.
    pub payload: Option<String>,
}

fn plain(tag: ContentTag) -> Classification {
    Classification {
        tag,
        tool_name: None,
        result_kind: None,
        payload: None,
    }
}

/// Classify one event body. Rules are evaluated in order and the first
/// match wins; matching is case-insensitive except the completion marker.
pub fn classify_text(actor: Actor, content: &str) -> Classification {
    let trimmed = content.trim_start();
    match actor {
        Actor::User => {
            if let Some(caps) = BRACKET_RESULT.captures(trimmed) {
                return Classification {
                    tag: ContentTag::ToolResult,
                    tool_name: Some(caps[1].to_string()),
                    result_kind: Some(ResultKind::Bracketed),
                    payload: None,
                };
            }
            if JSON_RESULT.is_match(trimmed) {
                return Classification {
                    tag: ContentTag::ToolResult,
                    tool_name: json_tool_name(trimmed),
                    result_kind: Some(ResultKind::Json),
                    payload: None,
                };
            }
            if starts_with_ignore_case(trimmed, ERROR_PREFIX) {
                return plain(ContentTag::Error);
            }
            if CONDENSATION.is_match(trimmed) {
                return plain(ContentTag::ContextCondensation);
            }
            if starts_with_ignore_case(trimmed, NEW_INSTRUCTIONS_PREFIX) {
                return Classification {
                    tag: ContentTag::NewInstructions,
                    tool_name: None,
                    result_kind: None,
                    payload: Some(trimmed[NEW_INSTRUCTIONS_PREFIX.len()..].trim().to_string()),
                };
            }
            plain(ContentTag::UserMessage)
        }
        Actor::Assistant => {
            if content.contains(COMPLETION_MARKER) {
                plain(ContentTag::Completion)
            } else {
                plain(ContentTag::ToolCall)
            }
        }
    }
}

/// ASCII-case-insensitive prefix check, safe on multi-byte content.
fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn json_tool_name(text: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    value
        .get("tool")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn actor_for_role(role: MessageRole) -> Actor {
    match role {
        MessageRole::Assistant => Actor::Assistant,
        // System and unrecognised roles classify under the user rules;
        // they never carry completion markers.
        MessageRole::User | MessageRole::System | MessageRole::Other => Actor::User,
    }
}

/// Classify an agent-exchange message stream (primary path).
pub fn classify_messages(events: &[MessageEvent]) -> Vec<ClassifiedItem> {
    let mut items: Vec<ClassifiedItem> = events
        .iter()
        .map(|event| {
            let actor = actor_for_role(event.role);
            let c = classify_text(actor, &event.text);

            // Assistant messages whose parts carry an explicit tool_use
            // get that name attached to the ToolCall item.
            let tool_name = c.tool_name.or_else(|| {
                (c.tag == ContentTag::ToolCall)
                    .then(|| event.tool_uses.first().map(|t| t.name.clone()))
                    .flatten()
            });

            ClassifiedItem {
                actor,
                tag: c.tag,
                content: event.text.clone(),
                original_index: event.index,
                timestamp: event.timestamp,
                line_number: None,
                tool_name,
                result_kind: c.result_kind,
            }
        })
        .collect();

    ClassifiedItem::sort_sequence(&mut items);
    items
}

/// Classify a UI-event stream (fallback path when no exchange log exists).
pub fn classify_ui_events(events: &[UiEvent]) -> Vec<ClassifiedItem> {
    let mut items: Vec<ClassifiedItem> = events
        .iter()
        .map(|event| {
            let actor = match event.kind {
                UiEventKind::Ask => Actor::User,
                UiEventKind::Say => Actor::Assistant,
            };
            let c = classify_text(actor, &event.text);
            ClassifiedItem {
                actor,
                tag: c.tag,
                content: event.text.clone(),
                original_index: event.index,
                timestamp: event.timestamp,
                line_number: None,
                tool_name: c.tool_name,
                result_kind: c.result_kind,
            }
        })
        .collect();

    ClassifiedItem::sort_sequence(&mut items);
    items
}

/// Classify a Markdown transcript export; items carry the marker line
/// numbers for navigation.
pub fn classify_transcript(sections: &[TranscriptSection]) -> Vec<ClassifiedItem> {
    sections
        .iter()
        .map(|section| {
            let actor = actor_for_role(section.role);
            let c = classify_text(actor, &section.text);
            ClassifiedItem {
                actor,
                tag: c.tag,
                content: section.text.clone(),
                original_index: section.index,
                timestamp: None,
                line_number: Some(section.line_number),
                tool_name: c.tool_name,
                result_kind: c.result_kind,
            }
        })
        .collect()
}
