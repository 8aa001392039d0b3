use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::skeleton::SkeletonMetadata;

/// Archive schema version this build writes and understands.
pub const ARCHIVE_SCHEMA_VERSION: u32 = 1;

/// Per-message cap inside an archive; bodies beyond this are cut and
/// marked with [`TRUNCATION_MARKER`].
pub const ARCHIVE_MESSAGE_MAX_BYTES: usize = 10 * 1024;

/// Literal suffix appended to truncated archive message bodies.
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// One message inside an archived task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Immutable cross-machine transport record for one task.
///
/// Addressed by `{machine_id, task_id}`; gzip-compressed JSON on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedTask {
    pub version: u32,
    pub task_id: String,
    pub machine_id: String,
    pub host_identifier: String,
    pub archived_at: DateTime<Utc>,
    pub metadata: SkeletonMetadata,
    pub messages: Vec<ArchivedMessage>,
}

impl ArchivedTask {
    pub fn is_supported_version(&self) -> bool {
        self.version == ARCHIVE_SCHEMA_VERSION
    }
}
