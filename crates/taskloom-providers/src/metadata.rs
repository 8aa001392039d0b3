use std::path::Path;

use serde::Deserialize;

use crate::Result;
use crate::io::{read_text, strip_bom};

/// Optional sidecar metadata written next to the task logs.
///
/// Every field is optional; the recorded parent pointer found here is
/// exactly the one that is frequently stale or dangling.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetadataFile {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default, alias = "parent_task_id")]
    pub parent_task_id: Option<String>,
    #[serde(default, alias = "workspace_dir", alias = "cwd")]
    pub workspace: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// Parse a `task_metadata.json` sidecar.
pub fn parse_metadata_file(path: &Path) -> Result<TaskMetadataFile> {
    let text = read_text(path)?;
    parse_metadata_str(&text)
}

pub fn parse_metadata_str(text: &str) -> Result<TaskMetadataFile> {
    Ok(serde_json::from_str(strip_bom(text))?)
}
