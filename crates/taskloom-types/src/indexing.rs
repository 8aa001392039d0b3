use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome class of the last indexing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    Success,
    Retry,
    /// Permanent failure. Never rescheduled until the state is reset.
    Failed,
}

/// Persisted idempotence state for the embedding/upsert pipeline.
///
/// Invariants:
/// - `index_status == Failed` excludes the task from scheduling.
/// - `next_reindex_after` only moves forward on successful reindex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexingState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_indexed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_reindex_after: Option<DateTime<Utc>>,

    pub index_status: IndexStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_error: Option<String>,

    #[serde(default)]
    pub index_retry_count: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_index_attempt: Option<DateTime<Utc>>,

    #[serde(default)]
    pub index_version: u32,
}

impl IndexingState {
    /// Fresh state after a successful (re)index at `now`.
    pub fn success(now: DateTime<Utc>, version: u32, ttl: chrono::Duration) -> Self {
        Self {
            last_indexed_at: Some(now),
            next_reindex_after: Some(now + ttl),
            index_status: IndexStatus::Success,
            index_error: None,
            index_retry_count: 0,
            last_index_attempt: Some(now),
            index_version: version,
        }
    }
}
