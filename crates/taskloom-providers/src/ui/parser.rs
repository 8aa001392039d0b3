use std::path::Path;

use crate::Result;
use crate::io::{read_text, strip_bom};

use super::schema::RawUiEvent;
use super::{UiEvent, UiEventKind};

/// Parse a UI-event log file.
pub fn parse_ui_file(path: &Path) -> Result<Vec<UiEvent>> {
    let text = read_text(path)?;
    parse_ui_str(&text)
}

/// Parse UI-event log text: a JSON array of ask/say events.
///
/// Individual events that fail to decode are dropped with a diagnostic;
/// only an unusable top level is an error.
pub fn parse_ui_str(text: &str) -> Result<Vec<UiEvent>> {
    let raw_values: Vec<serde_json::Value> = serde_json::from_str(strip_bom(text))?;

    let mut events = Vec::with_capacity(raw_values.len());
    for (index, value) in raw_values.into_iter().enumerate() {
        let raw: RawUiEvent = match serde_json::from_value(value) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(index, %err, "skipping malformed UI event");
                continue;
            }
        };

        let (kind, sub_kind) = match raw.kind.as_str() {
            "ask" => (UiEventKind::Ask, raw.ask),
            "say" => (UiEventKind::Say, raw.say),
            other => {
                tracing::debug!(index, kind = other, "skipping unknown UI event kind");
                continue;
            }
        };

        events.push(UiEvent {
            kind,
            sub_kind: sub_kind.unwrap_or_default(),
            text: raw.text.unwrap_or_default(),
            timestamp: raw.ts.as_ref().and_then(taskloom_types::parse_flexible),
            index,
        });
    }

    Ok(events)
}
