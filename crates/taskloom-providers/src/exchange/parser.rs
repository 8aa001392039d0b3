use std::path::Path;

use crate::Result;
use crate::io::{read_text, strip_bom};

use super::schema::{ExchangeLog, RawContent, RawMessage, RawPart};
use super::{MessageEvent, MessageRole, ToolUseRef};

/// Parse an agent-exchange log file into normalised message events.
pub fn parse_exchange_file(path: &Path) -> Result<Vec<MessageEvent>> {
    let text = read_text(path)?;
    parse_exchange_str(&text)
}

/// Parse agent-exchange log text (either encoding, see schema).
///
/// A record that fails to decode becomes an `[ERROR]`-prefixed event at
/// its original position, so classification tags it instead of the file
/// failing wholesale.
pub fn parse_exchange_str(text: &str) -> Result<Vec<MessageEvent>> {
    let log: ExchangeLog = serde_json::from_str(strip_bom(text))?;

    let events = log
        .into_messages()
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            let raw: RawMessage = match serde_json::from_value(value) {
                Ok(raw) => raw,
                Err(err) => {
                    return MessageEvent {
                        role: MessageRole::Other,
                        text: format!("[ERROR] malformed message record: {}", err),
                        tool_uses: Vec::new(),
                        tool_results: Vec::new(),
                        timestamp: None,
                        index,
                    };
                }
            };
            let timestamp = raw.timestamp.as_ref().and_then(taskloom_types::parse_flexible);
            let role = MessageRole::from_str(&raw.role);

            let mut texts: Vec<String> = Vec::new();
            let mut tool_uses = Vec::new();
            let mut tool_results = Vec::new();

            match raw.content {
                Some(RawContent::Text(body)) => texts.push(body),
                Some(RawContent::Parts(parts)) => {
                    for part in parts {
                        match part {
                            RawPart::Text { text } => texts.push(text),
                            RawPart::ToolUse { name, input } => {
                                tool_uses.push(ToolUseRef { name, input });
                            }
                            RawPart::ToolResult {
                                tool_use_id,
                                content,
                            } => {
                                // Result bodies are often bracket-form text
                                // carrying the tool name; fall back to the id.
                                if let Some(text) = content.as_ref().and_then(|v| v.as_str()) {
                                    texts.push(text.to_string());
                                }
                                tool_results
                                    .push(tool_use_id.unwrap_or_else(|| "unknown".to_string()));
                            }
                            RawPart::Thinking { .. } | RawPart::Unknown => {}
                        }
                    }
                }
                None => {}
            }

            MessageEvent {
                role,
                text: texts.join(" "),
                tool_uses,
                tool_results,
                timestamp,
                index,
            }
        })
        .collect();

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_array_with_string_content() {
        let events = parse_exchange_str(
            r#"[
                {"role": "user", "content": "Fix the login bug", "timestamp": "2025-01-01T10:00:00Z"},
                {"role": "assistant", "content": "Looking into it"}
            ]"#,
        )
        .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].role, MessageRole::User);
        assert_eq!(events[0].text, "Fix the login bug");
        assert!(events[0].timestamp.is_some());
        assert_eq!(events[1].role, MessageRole::Assistant);
        assert!(events[1].timestamp.is_none());
    }

    #[test]
    fn parses_wrapped_object_with_parts() {
        let events = parse_exchange_str(
            r#"{"messages": [
                {"role": "assistant", "content": [
                    {"type": "text", "text": "Reading"},
                    {"type": "tool_use", "name": "read_file", "input": {"path": "src/main.rs"}},
                    {"type": "text", "text": "now"}
                ], "ts": 1735732800000}
            ]}"#,
        )
        .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].text, "Reading now");
        assert_eq!(events[0].tool_uses.len(), 1);
        assert_eq!(events[0].tool_uses[0].name, "read_file");
        assert!(events[0].timestamp.is_some());
    }

    #[test]
    fn tolerates_bom_and_unknown_parts() {
        let events = parse_exchange_str(
            "\u{feff}[{\"role\": \"user\", \"content\": [{\"type\": \"image\", \"source\": {}}, {\"type\": \"text\", \"text\": \"hi there friend\"}]}]",
        )
        .unwrap();
        assert_eq!(events[0].text, "hi there friend");
    }

    #[test]
    fn tool_result_text_is_captured() {
        let events = parse_exchange_str(
            r#"[{"role": "user", "content": [
                {"type": "tool_result", "tool_use_id": "t1", "content": "[read_file] Result: fn main() {}"}
            ]}]"#,
        )
        .unwrap();
        assert!(events[0].text.starts_with("[read_file] Result:"));
        assert_eq!(events[0].tool_results, vec!["t1"]);
    }

    #[test]
    fn malformed_record_degrades_to_error_event() {
        let events = parse_exchange_str(
            r#"[
                {"role": "user", "content": "fine"},
                {"content": "no role on this one"},
                {"role": "assistant", "content": "also fine"}
            ]"#,
        )
        .unwrap();
        assert_eq!(events.len(), 3);
        assert!(events[1].text.starts_with("[ERROR]"));
        assert_eq!(events[1].index, 1);
    }

    #[test]
    fn malformed_log_is_an_error() {
        assert!(parse_exchange_str("{\"nope\": 1}").is_err());
        assert!(parse_exchange_str("not json").is_err());
    }
}
