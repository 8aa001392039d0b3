use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classified::ClassifiedItem;
use crate::indexing::IndexingState;

/// Aggregated metadata for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkeletonMetadata {
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    pub message_count: usize,
    pub action_count: usize,
    pub total_size: u64,

    /// Task directory this skeleton was built from.
    pub data_source: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexing_state: Option<IndexingState>,

    /// Pre-`indexing_state` stores kept a bare indexed-at timestamp.
    /// Carried through deserialisation so migration can honour it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_indexed_at: Option<DateTime<Utc>>,
}

impl SkeletonMetadata {
    pub fn new(data_source: PathBuf, now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            last_activity: now,
            title: None,
            workspace: None,
            mode: None,
            message_count: 0,
            action_count: 0,
            total_size: 0,
            data_source,
            indexing_state: None,
            legacy_indexed_at: None,
        }
    }
}

/// Per-task build/reconstruction bookkeeping, persisted with the skeleton.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingState {
    #[serde(default)]
    pub phase1_done: bool,
    #[serde(default)]
    pub phase2_done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_processed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ProcessingState {
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }
}

/// How a reconstructed parent edge was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    RootDetected,
    RadixTreeExact,
    RadixTree,
    Metadata,
    TemporalProximity,
}

impl ResolutionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionMethod::RootDetected => "root_detected",
            ResolutionMethod::RadixTreeExact => "radix_tree_exact",
            ResolutionMethod::RadixTree => "radix_tree",
            ResolutionMethod::Metadata => "metadata",
            ResolutionMethod::TemporalProximity => "temporal_proximity",
        }
    }
}

/// Canonical per-task conversation state.
///
/// The skeleton is the unit of persistence (one JSON file per task under
/// `.skeletons/`) and the unit of exchange between every subsystem:
/// built by the skeleton builder, read by the reconstruction engine and
/// the navigator, annotated by the indexing pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSkeleton {
    pub task_id: String,

    /// Parent recorded in the task's own metadata. Frequently absent,
    /// stale, or pointing at a task that no longer exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<String>,

    /// Parent recovered by the reconstruction engine. Takes precedence
    /// over `parent_task_id` when resolving the effective parent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconstructed_parent_id: Option<String>,

    /// First substantial user instruction, reduced to a normalised prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated_instruction: Option<String>,

    /// Normalised prefixes of sub-task delegations found in this task's
    /// UI log, in extraction order, deduplicated.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_task_instruction_prefixes: Vec<String>,

    /// Classified event sequence. May be empty when elided to save memory.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sequence: Vec<ClassifiedItem>,

    pub metadata: SkeletonMetadata,

    #[serde(default)]
    pub is_completed: bool,

    #[serde(default)]
    pub processing: ProcessingState,

    /// md5 per source file name, captured when the skeleton was built.
    /// Drift against the on-disk files triggers a rebuild.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub source_checksums: BTreeMap<String, String>,
}

impl ConversationSkeleton {
    pub fn new(task_id: impl Into<String>, metadata: SkeletonMetadata) -> Self {
        Self {
            task_id: task_id.into(),
            parent_task_id: None,
            reconstructed_parent_id: None,
            truncated_instruction: None,
            child_task_instruction_prefixes: Vec::new(),
            sequence: Vec::new(),
            metadata,
            is_completed: false,
            processing: ProcessingState::default(),
            source_checksums: BTreeMap::new(),
        }
    }

    /// Effective parent: reconstructed if present, else the recorded one.
    ///
    /// The recorded pointer is only honoured when `known` confirms it
    /// identifies a task in the current cache generation.
    pub fn effective_parent_id<F>(&self, known: F) -> Option<&str>
    where
        F: Fn(&str) -> bool,
    {
        if let Some(id) = self.reconstructed_parent_id.as_deref() {
            return Some(id);
        }
        match self.parent_task_id.as_deref() {
            Some(id) if known(id) => Some(id),
            _ => None,
        }
    }

    /// Insert a child instruction prefix, preserving order, deduplicating.
    pub fn push_child_prefix(&mut self, prefix: impl Into<String>) {
        let prefix = prefix.into();
        if !self.child_task_instruction_prefixes.contains(&prefix) {
            self.child_task_instruction_prefixes.push(prefix);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skeleton(id: &str) -> ConversationSkeleton {
        ConversationSkeleton::new(id, SkeletonMetadata::new(PathBuf::from("/tmp"), Utc::now()))
    }

    #[test]
    fn effective_parent_prefers_reconstructed() {
        let mut s = skeleton("a");
        s.parent_task_id = Some("recorded".to_string());
        s.reconstructed_parent_id = Some("rebuilt".to_string());
        assert_eq!(s.effective_parent_id(|_| true), Some("rebuilt"));
    }

    #[test]
    fn recorded_parent_requires_known_task() {
        let mut s = skeleton("a");
        s.parent_task_id = Some("gone".to_string());
        assert_eq!(s.effective_parent_id(|_| false), None);
        assert_eq!(s.effective_parent_id(|id| id == "gone"), Some("gone"));
    }

    #[test]
    fn child_prefixes_dedup_preserving_order() {
        let mut s = skeleton("a");
        s.push_child_prefix("first");
        s.push_child_prefix("second");
        s.push_child_prefix("first");
        assert_eq!(s.child_task_instruction_prefixes, vec!["first", "second"]);
    }
}
