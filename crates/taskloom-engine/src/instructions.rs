use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use taskloom_providers::UiEvent;

use crate::normalize::{is_substantial, normalize_prefix};

/// One sub-task delegation recovered from a parent's UI log.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedDelegation {
    /// Canonical mode slug, `unknown` when the pattern carries none.
    pub mode: String,
    /// Original instruction text as delegated.
    pub content: String,
    /// Normalised prefix of `content`, the index key.
    pub prefix: String,
    /// UI-log position the delegation was found at.
    pub event_index: usize,
}

/// `ask/tool` payload for the delegation tool.
#[derive(Debug, Deserialize)]
struct NewTaskPayload {
    tool: String,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

// API-request trace form: [new_task in <mode> mode: '<content>']
// Escaped quotes inside the content are respected.
static API_TRACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\[new_task in (.+?) mode: '((?:\\.|[^'\\])*)'\]").unwrap()
});

// Structured XML delegation blocks
static NEW_TASK_XML: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<new_task>.*?<mode>(.*?)</mode>.*?<message>(.*?)</message>.*?</new_task>")
        .unwrap()
});

// Custom delegation roots: any tag ending in _complex or _delegation
static CUSTOM_ROOT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<([a-z_][a-z0-9_\-:]*_(?:complex|delegation))>").unwrap());

static MODE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<mode>(.*?)</mode>").unwrap());
static MESSAGE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<message>(.*?)</message>").unwrap());

// Bare task blocks, lowest-priority pattern
static BARE_TASK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<task>(.*?)</task>").unwrap());

/// Extract the ordered list of sub-task delegations from a UI log.
///
/// Five recognisers run per event, in order; duplicates collapse on
/// `(mode, prefix)`. Prefixes below the minimum grapheme length are
/// dropped as noise.
pub fn extract_delegations(events: &[UiEvent], k: usize) -> Vec<ExtractedDelegation> {
    let mut out: Vec<ExtractedDelegation> = Vec::new();
    let mut seen: std::collections::HashSet<(String, String)> = std::collections::HashSet::new();

    let mut push = |mode: String, content: String, event_index: usize, out: &mut Vec<_>| {
        let prefix = normalize_prefix(&content, k);
        if !is_substantial(&prefix) {
            return;
        }
        if seen.insert((mode.clone(), prefix.clone())) {
            out.push(ExtractedDelegation {
                mode,
                content,
                prefix,
                event_index,
            });
        }
    };

    for event in events {
        // 1. Tool-call JSON payload (the primary, well-formed path)
        if event.is_tool_ask()
            && let Ok(payload) = serde_json::from_str::<NewTaskPayload>(&event.text)
            && payload.tool == "newTask"
            && let (Some(mode), Some(content)) = (payload.mode, payload.content)
        {
            push(canonicalize_mode(&mode), content, event.index, &mut out);
        }

        // 2. API-request trace
        if event.is_api_request_trace() {
            for caps in API_TRACE.captures_iter(&event.text) {
                let content = caps[2].replace("\\'", "'").replace("\\\\", "\\");
                push(canonicalize_mode(&caps[1]), content, event.index, &mut out);
            }
        }

        // 3. Structured <new_task> XML, in any event body
        for caps in NEW_TASK_XML.captures_iter(&event.text) {
            push(
                canonicalize_mode(caps[1].trim()),
                caps[2].trim().to_string(),
                event.index,
                &mut out,
            );
        }

        // 4. Custom delegation roots (<foo_complex> / <foo_delegation>)
        for root in CUSTOM_ROOT.captures_iter(&event.text) {
            if let Some(body) = tag_body(&event.text, &root[1]) {
                let mode = MODE_TAG
                    .captures(body)
                    .map(|c| canonicalize_mode(c[1].trim()))
                    .unwrap_or_else(|| "unknown".to_string());
                if let Some(message) = MESSAGE_TAG.captures(body) {
                    push(mode, message[1].trim().to_string(), event.index, &mut out);
                }
            }
        }

        // 5. Bare <task> blocks
        for caps in BARE_TASK.captures_iter(&event.text) {
            push(
                "unknown".to_string(),
                caps[1].trim().to_string(),
                event.index,
                &mut out,
            );
        }
    }

    out
}

/// Body between `<name>` and `</name>`. The regex crate has no
/// backreferences, so the closing tag is located by plain search.
fn tag_body<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    let open = format!("<{}>", name);
    let close = format!("</{}>", name);
    let start = text.find(&open)? + open.len();
    let end = text[start..].find(&close)? + start;
    Some(&text[start..end])
}

const MODE_ALIASES: &[&str] = &["orchestrator", "code", "ask", "debug", "architect", "manager"];

/// Canonicalise a mode label: drop emoji and punctuation, lowercase, then
/// map onto a known alias by substring. Unknown labels pass through
/// lowercased; empty results fall back to `unknown`.
pub fn canonicalize_mode(mode: &str) -> String {
    let cleaned: String = mode
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase();

    if cleaned.is_empty() {
        return "unknown".to_string();
    }
    for alias in MODE_ALIASES {
        if cleaned.contains(alias) {
            return (*alias).to_string();
        }
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskloom_providers::UiEventKind;
    use taskloom_types::PREFIX_LENGTH;

    fn ask_tool(index: usize, text: &str) -> UiEvent {
        UiEvent {
            kind: UiEventKind::Ask,
            sub_kind: "tool".to_string(),
            text: text.to_string(),
            timestamp: None,
            index,
        }
    }

    fn say(index: usize, sub_kind: &str, text: &str) -> UiEvent {
        UiEvent {
            kind: UiEventKind::Say,
            sub_kind: sub_kind.to_string(),
            text: text.to_string(),
            timestamp: None,
            index,
        }
    }

    #[test]
    fn tool_call_json_is_primary() {
        let events = vec![ask_tool(
            0,
            r#"{"tool":"newTask","mode":"🪃 Orchestrator","content":"Implement the retry logic for uploads"}"#,
        )];
        let found = extract_delegations(&events, PREFIX_LENGTH);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].mode, "orchestrator");
        assert_eq!(found[0].prefix, "Implement the retry logic for uploads");
    }

    #[test]
    fn api_trace_with_escaped_quotes() {
        let events = vec![say(
            3,
            "api_req_started",
            r"request body [new_task in code mode: 'fix the parser\'s error path in lexer.rs'] sent",
        )];
        let found = extract_delegations(&events, PREFIX_LENGTH);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].mode, "code");
        assert_eq!(found[0].content, "fix the parser's error path in lexer.rs");
    }

    #[test]
    fn structured_xml_in_any_body() {
        let events = vec![say(
            0,
            "text",
            "<new_task>\n<mode>debug</mode>\n<message>Trace the failing integration test end to end</message>\n</new_task>",
        )];
        let found = extract_delegations(&events, PREFIX_LENGTH);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].mode, "debug");
        assert!(found[0].content.starts_with("Trace the failing"));
    }

    #[test]
    fn custom_delegation_root() {
        let events = vec![say(
            0,
            "text",
            "<refactor_delegation><mode>architect</mode><message>Split the storage module into reader and writer halves</message></refactor_delegation>",
        )];
        let found = extract_delegations(&events, PREFIX_LENGTH);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].mode, "architect");
    }

    #[test]
    fn bare_task_gets_unknown_mode() {
        let events = vec![say(0, "text", "<task>Document the public API of the cache</task>")];
        let found = extract_delegations(&events, PREFIX_LENGTH);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].mode, "unknown");
    }

    #[test]
    fn duplicates_collapse_on_mode_and_prefix() {
        let events = vec![
            ask_tool(0, r#"{"tool":"newTask","mode":"code","content":"Fix the login bug now"}"#),
            say(
                1,
                "api_req_started",
                "[new_task in code mode: 'Fix the login bug now']",
            ),
        ];
        let found = extract_delegations(&events, PREFIX_LENGTH);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn short_instructions_are_discarded() {
        let events = vec![ask_tool(0, r#"{"tool":"newTask","mode":"code","content":"hi"}"#)];
        assert!(extract_delegations(&events, PREFIX_LENGTH).is_empty());
    }

    #[test]
    fn non_new_task_tools_are_ignored() {
        let events = vec![ask_tool(
            0,
            r#"{"tool":"readFile","mode":"code","content":"src/main.rs is quite long"}"#,
        )];
        assert!(extract_delegations(&events, PREFIX_LENGTH).is_empty());
    }

    #[test]
    fn canonicalize_strips_emoji_and_maps_aliases() {
        assert_eq!(canonicalize_mode("🪃 Orchestrator"), "orchestrator");
        assert_eq!(canonicalize_mode("Code Reviewer"), "code");
        assert_eq!(canonicalize_mode("💬 Ask"), "ask");
        assert_eq!(canonicalize_mode("custom-flow"), "customflow");
        assert_eq!(canonicalize_mode("🎉"), "unknown");
    }
}
