mod parser;
mod schema;

pub use parser::{parse_ui_file, parse_ui_str};

use chrono::{DateTime, Utc};

/// Direction of a UI event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiEventKind {
    /// Agent asking the user (approvals, tool confirmations, followups)
    Ask,
    /// Agent telling the user (text, API traces, status)
    Say,
}

/// One UI-log event, timestamped in milliseconds at the source.
#[derive(Debug, Clone)]
pub struct UiEvent {
    pub kind: UiEventKind,
    /// The ask/say sub-kind, e.g. `tool`, `text`, `api_req_started`.
    pub sub_kind: String,
    pub text: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub index: usize,
}

impl UiEvent {
    /// Whether this is an `ask/tool` event, whose text is a JSON tool
    /// invocation payload.
    pub fn is_tool_ask(&self) -> bool {
        self.kind == UiEventKind::Ask && self.sub_kind == "tool"
    }

    /// Whether this is a `say/api_req_started` trace event.
    pub fn is_api_request_trace(&self) -> bool {
        self.kind == UiEventKind::Say && self.sub_kind == "api_req_started"
    }
}
