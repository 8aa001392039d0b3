mod pass1;
mod pass2;

pub use pass1::Pass1Metrics;
pub use pass2::Pass2Metrics;

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use taskloom_types::{ConversationSkeleton, PREFIX_LENGTH, ResolutionMethod};

use crate::radix::RadixTree;

/// Matching regime for orphan resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Exact normalised-prefix equality only.
    Strict,
    /// Strict first, then similarity / metadata / temporal fallbacks.
    Permissive,
}

/// Tunables for the two-pass reconstruction.
#[derive(Debug, Clone)]
pub struct ReconstructionConfig {
    pub mode: MatchMode,
    /// Minimum lcp share for a similarity hit to be considered at all.
    pub similarity_threshold: f64,
    /// Floor below which a candidate never becomes the effective parent.
    pub min_confidence_score: f64,
    pub prefix_length: usize,
    /// Window for the temporal-proximity fallback.
    pub temporal_window: chrono::Duration,
    /// Restrict both passes to tasks in this workspace.
    pub workspace_filter: Option<String>,
    /// Re-run pass 1 extraction even when checksums are unchanged.
    pub force_rebuild: bool,
    /// Per-skeleton wall-clock budget; overruns are recorded as errors.
    pub operation_timeout: std::time::Duration,
    /// Instructions matching any of these are root tasks...
    pub root_patterns: Vec<Regex>,
    /// ...unless they also match one of these.
    pub subtask_markers: Vec<Regex>,
}

static DEFAULT_ROOT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)^(bonjour|salut|hello|hi|hey)\b",
        r"(?i)^good (morning|afternoon|evening)\b",
        r"(?i)^\[root task\]",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static DEFAULT_SUBTASK_MARKERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)^\*\*mission\b",
        r"(?i)^\[subtask\]",
        r"(?i)^contexte h[ée]rit[ée]",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            mode: MatchMode::Strict,
            similarity_threshold: 0.2,
            min_confidence_score: 0.3,
            prefix_length: PREFIX_LENGTH,
            temporal_window: chrono::Duration::minutes(5),
            workspace_filter: None,
            force_rebuild: false,
            operation_timeout: std::time::Duration::from_secs(30),
            root_patterns: DEFAULT_ROOT_PATTERNS.clone(),
            subtask_markers: DEFAULT_SUBTASK_MARKERS.clone(),
        }
    }
}

impl ReconstructionConfig {
    pub fn permissive() -> Self {
        Self {
            mode: MatchMode::Permissive,
            ..Self::default()
        }
    }

    fn matches_root_pattern(&self, instruction: &str) -> bool {
        self.root_patterns.iter().any(|re| re.is_match(instruction))
            && !self.subtask_markers.iter().any(|re| re.is_match(instruction))
    }

    fn in_scope(&self, skeleton: &ConversationSkeleton) -> bool {
        match &self.workspace_filter {
            Some(filter) => skeleton.metadata.workspace.as_deref() == Some(filter.as_str()),
            None => true,
        }
    }
}

/// In-memory resolution record for one task; discarded with the engine
/// except for the reconstructed parent id, which is persisted into the
/// skeleton itself.
#[derive(Debug, Clone, Default)]
pub struct TaskResolution {
    pub is_root_task: bool,
    pub method: Option<ResolutionMethod>,
    pub confidence: f64,
    pub reconstructed_parent_id: Option<String>,
    /// Why the task stayed unresolved or lost its recorded parent.
    pub note: Option<String>,
}

/// Two-pass hierarchy reconstruction over a skeleton set.
///
/// Pass 1 builds the instruction index from every task's delegations;
/// pass 2 resolves orphans against it. Tasks are processed in ascending
/// task-id order and results are independent of the internal parallelism.
pub struct ReconstructionEngine {
    config: ReconstructionConfig,
    index: RadixTree,
    /// Tasks whose delegations currently sit in the index; guards pass-1
    /// idempotence across repeated runs of one engine.
    indexed_tasks: std::collections::HashSet<String>,
    overlay: BTreeMap<String, TaskResolution>,
}

impl ReconstructionEngine {
    pub fn new(config: ReconstructionConfig) -> Self {
        Self {
            config,
            index: RadixTree::new(),
            indexed_tasks: std::collections::HashSet::new(),
            overlay: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    pub fn index(&self) -> &RadixTree {
        &self.index
    }

    /// Per-task resolution overlay from the last pass-2 run.
    pub fn overlay(&self) -> &BTreeMap<String, TaskResolution> {
        &self.overlay
    }

    pub fn resolution(&self, task_id: &str) -> Option<&TaskResolution> {
        self.overlay.get(task_id)
    }
}

/// Effective parent under the current skeleton set: reconstructed edge
/// first, recorded edge only when it points at a known task.
pub(crate) fn effective_parent<'a>(
    skeletons: &'a BTreeMap<String, ConversationSkeleton>,
    task_id: &str,
) -> Option<&'a str> {
    let skeleton = skeletons.get(task_id)?;
    skeleton.effective_parent_id(|id| skeletons.contains_key(id))
}

/// Would adding `child -> parent` close a cycle? Iterative upward walk
/// with an explicit visited set, bounded by the skeleton count.
pub(crate) fn creates_cycle(
    skeletons: &BTreeMap<String, ConversationSkeleton>,
    child: &str,
    parent: &str,
) -> bool {
    let mut visited: std::collections::HashSet<&str> = std::collections::HashSet::new();
    let mut current = Some(parent);

    while let Some(id) = current {
        if id == child {
            return true;
        }
        if !visited.insert(id) {
            // Pre-existing loop above the candidate; joining it would
            // never reach nil, so refuse the edge.
            return true;
        }
        current = effective_parent(skeletons, id);
    }
    false
}
