use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use rayon::prelude::*;

use taskloom_types::{ConversationSkeleton, ResolutionMethod};

use crate::normalize::grapheme_len;
use crate::radix::SimilarMatch;

use super::{MatchMode, ReconstructionEngine, TaskResolution, creates_cycle};

/// Pass-2 result summary.
#[derive(Debug, Clone, Default)]
pub struct Pass2Metrics {
    pub processed: usize,
    /// Recorded parents that survived validation untouched.
    pub already_linked: usize,
    pub roots_detected: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub avg_confidence: f64,
    pub method_counts: BTreeMap<&'static str, usize>,
    pub wall_time: std::time::Duration,
}

/// Candidate searches are pure reads over the frozen index, so they run
/// in parallel up front; resolution itself is serial in ascending
/// task-id order because each acceptance changes the cycle landscape.
struct Precomputed {
    strict_ids: Vec<String>,
    similar: Vec<SimilarMatch>,
}

impl ReconstructionEngine {
    /// Pass 2: resolve every orphan against the instruction index.
    pub fn run_pass2(
        &mut self,
        skeletons: &mut BTreeMap<String, ConversationSkeleton>,
    ) -> Pass2Metrics {
        let started = Instant::now();
        let mut metrics = Pass2Metrics::default();
        let config = self.config.clone();
        self.overlay.clear();

        let task_ids: Vec<String> = skeletons
            .values()
            .filter(|s| config.in_scope(s))
            .map(|s| s.task_id.clone())
            .collect();

        let searches: HashMap<String, Precomputed> = {
            let index = &self.index;
            let frozen: &BTreeMap<String, ConversationSkeleton> = skeletons;
            task_ids
                .par_iter()
                .map(|task_id| {
                    let instruction = frozen[task_id].truncated_instruction.as_deref();
                    let pre = match instruction {
                        Some(query) => {
                            let mut strict_ids: Vec<String> = index
                                .search_exact_prefix(query)
                                .iter()
                                .map(|e| e.task_id.clone())
                                .filter(|id| id != task_id)
                                .collect();
                            strict_ids.sort();
                            strict_ids.dedup();

                            let similar = if config.mode == MatchMode::Permissive {
                                index.search_similar(query, config.similarity_threshold)
                            } else {
                                Vec::new()
                            };
                            Precomputed {
                                strict_ids,
                                similar,
                            }
                        }
                        None => Precomputed {
                            strict_ids: Vec::new(),
                            similar: Vec::new(),
                        },
                    };
                    (task_id.clone(), pre)
                })
                .collect()
        };

        let mut confidence_sum = 0.0;

        for task_id in &task_ids {
            metrics.processed += 1;
            let task_started = Instant::now();
            let mut resolution = TaskResolution::default();

            // Recorded parent first: keep it when it validates, drop it
            // when it cannot hold (temporal paradox, cycle, workspace).
            let recorded = skeletons[task_id].parent_task_id.clone();
            if let Some(parent_id) = recorded
                && skeletons.contains_key(&parent_id)
            {
                match validate_edge(skeletons, task_id, &parent_id, 1.0, &config) {
                    Ok(()) => {
                        metrics.already_linked += 1;
                        self.overlay.insert(task_id.clone(), resolution);
                        continue;
                    }
                    Err(reason) => {
                        tracing::debug!(%task_id, %parent_id, %reason, "recorded parent rejected");
                        resolution.note =
                            Some(format!("recorded parent {} rejected: {}", parent_id, reason));
                        skeletons.get_mut(task_id).expect("iterating keys").parent_task_id = None;
                    }
                }
            }

            // Root detection
            let instruction = skeletons[task_id].truncated_instruction.clone();
            let is_root = match instruction.as_deref() {
                None => true,
                Some(text) => grapheme_len(text) < 10 || config.matches_root_pattern(text),
            };
            if is_root {
                resolution.is_root_task = true;
                resolution.method = Some(ResolutionMethod::RootDetected);
                metrics.roots_detected += 1;
                self.overlay.insert(task_id.clone(), resolution);
                continue;
            }

            // Candidate resolution against the index
            let pre = &searches[task_id];
            let accepted = self.resolve_candidates(skeletons, task_id, pre, &mut resolution);

            match accepted {
                Some((parent_id, confidence, method)) => {
                    let skeleton = skeletons.get_mut(task_id).expect("iterating keys");
                    skeleton.reconstructed_parent_id = Some(parent_id.clone());
                    resolution.reconstructed_parent_id = Some(parent_id);
                    resolution.confidence = confidence;
                    resolution.method = Some(method);
                    confidence_sum += confidence;
                    metrics.resolved += 1;
                    *metrics.method_counts.entry(method.as_str()).or_default() += 1;
                }
                None => {
                    metrics.unresolved += 1;
                }
            }

            if task_started.elapsed() > config.operation_timeout {
                let message = format!(
                    "pass 2 exceeded operation timeout ({:?})",
                    config.operation_timeout
                );
                skeletons
                    .get_mut(task_id)
                    .expect("iterating keys")
                    .processing
                    .record_error(message);
            }
            self.overlay.insert(task_id.clone(), resolution);
        }

        if metrics.resolved > 0 {
            metrics.avg_confidence = confidence_sum / metrics.resolved as f64;
        }
        metrics.wall_time = started.elapsed();
        tracing::debug!(
            resolved = metrics.resolved,
            unresolved = metrics.unresolved,
            roots = metrics.roots_detected,
            "pass 2 complete"
        );
        metrics
    }

    fn resolve_candidates(
        &self,
        skeletons: &BTreeMap<String, ConversationSkeleton>,
        task_id: &str,
        pre: &Precomputed,
        resolution: &mut TaskResolution,
    ) -> Option<(String, f64, ResolutionMethod)> {
        let config = &self.config;

        // Strict: a unique exact-prefix owner, or nothing.
        match pre.strict_ids.as_slice() {
            [only] => {
                match validate_edge(skeletons, task_id, only, 1.0, config) {
                    Ok(()) => return Some((only.clone(), 1.0, ResolutionMethod::RadixTreeExact)),
                    Err(reason) => {
                        resolution.note = Some(format!("exact match {} rejected: {}", only, reason));
                        if config.mode == MatchMode::Strict {
                            return None;
                        }
                    }
                }
            }
            [] => {}
            many => {
                resolution.note = Some(format!("ambiguous exact match ({} parents)", many.len()));
                if config.mode == MatchMode::Strict {
                    return None;
                }
            }
        }
        if config.mode == MatchMode::Strict {
            return None;
        }

        // Permissive 1: similarity, best first.
        for hit in &pre.similar {
            let candidate = &hit.entry.task_id;
            if candidate == task_id || !skeletons.contains_key(candidate) {
                continue;
            }
            if validate_edge(skeletons, task_id, candidate, hit.similarity, config).is_ok() {
                return Some((candidate.clone(), hit.similarity, ResolutionMethod::RadixTree));
            }
        }

        // Permissive 2: a same-workspace task whose stored delegation
        // prefix opens this task's instruction.
        let child = &skeletons[task_id];
        let instruction = child.truncated_instruction.as_deref().unwrap_or_default();
        if child.metadata.workspace.is_some() {
            for (candidate_id, candidate) in skeletons {
                if candidate_id == task_id
                    || candidate.metadata.workspace != child.metadata.workspace
                {
                    continue;
                }
                let opens = candidate
                    .child_task_instruction_prefixes
                    .iter()
                    .any(|prefix| instruction.starts_with(prefix.as_str()));
                if opens && validate_edge(skeletons, task_id, candidate_id, 0.5, config).is_ok() {
                    return Some((candidate_id.clone(), 0.5, ResolutionMethod::Metadata));
                }
            }
        }

        // Permissive 3: newest same-workspace task created just before.
        if child.metadata.workspace.is_some() {
            let created = child.metadata.created_at;
            let mut best: Option<&ConversationSkeleton> = None;
            for (candidate_id, candidate) in skeletons {
                if candidate_id == task_id
                    || candidate.metadata.workspace != child.metadata.workspace
                {
                    continue;
                }
                let delta = created - candidate.metadata.created_at;
                if delta <= chrono::Duration::zero() || delta > config.temporal_window {
                    continue;
                }
                let newer = match best {
                    None => true,
                    Some(current) => candidate.metadata.created_at > current.metadata.created_at,
                };
                if newer {
                    best = Some(candidate);
                }
            }
            if let Some(candidate) = best
                && validate_edge(skeletons, task_id, &candidate.task_id, 0.4, config).is_ok()
            {
                return Some((
                    candidate.task_id.clone(),
                    0.4,
                    ResolutionMethod::TemporalProximity,
                ));
            }
        }

        None
    }
}

/// Validity constraints for a candidate edge `child -> parent`.
fn validate_edge(
    skeletons: &BTreeMap<String, ConversationSkeleton>,
    child_id: &str,
    parent_id: &str,
    confidence: f64,
    config: &super::ReconstructionConfig,
) -> Result<(), String> {
    if parent_id == child_id {
        return Err("task cannot parent itself".to_string());
    }
    let Some(parent) = skeletons.get(parent_id) else {
        return Err("parent unknown".to_string());
    };
    let child = skeletons.get(child_id).expect("child is being resolved");

    if parent.metadata.created_at > child.metadata.created_at {
        return Err(format!(
            "parent created after child ({} > {})",
            parent.metadata.created_at, child.metadata.created_at
        ));
    }

    if creates_cycle(skeletons, child_id, parent_id) {
        return Err("edge would close a cycle".to_string());
    }

    if let (Some(parent_ws), Some(child_ws)) = (
        parent.metadata.workspace.as_deref(),
        child.metadata.workspace.as_deref(),
    ) && parent_ws != child_ws
    {
        return Err(format!(
            "workspace mismatch ({} vs {})",
            parent_ws, child_ws
        ));
    }

    if confidence < config.min_confidence_score {
        return Err(format!(
            "confidence {:.2} below floor {:.2}",
            confidence, config.min_confidence_score
        ));
    }

    Ok(())
}
