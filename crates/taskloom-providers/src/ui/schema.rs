use serde::Deserialize;
use serde_json::Value;

/// Raw UI-log event. The `type` field selects which of `ask`/`say`
/// carries the sub-kind; everything else is optional in practice.
#[derive(Debug, Deserialize)]
pub(crate) struct RawUiEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub ask: Option<String>,
    #[serde(default)]
    pub say: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    /// Milliseconds since epoch, occasionally an ISO string.
    #[serde(default)]
    pub ts: Option<Value>,
}
