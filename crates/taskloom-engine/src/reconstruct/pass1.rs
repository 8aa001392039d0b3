use std::collections::BTreeMap;
use std::time::Instant;

use rayon::prelude::*;

use taskloom_providers::{TaskDetector, parse_ui_file};
use taskloom_types::ConversationSkeleton;

use crate::instructions::{ExtractedDelegation, extract_delegations};
use crate::radix::PrefixEntry;

use super::ReconstructionEngine;

/// Pass-1 result summary.
#[derive(Debug, Clone, Default)]
pub struct Pass1Metrics {
    /// Tasks whose UI log was (re)extracted this run.
    pub processed: usize,
    /// Tasks skipped because their extraction is already current.
    pub skipped: usize,
    /// Tasks that yielded at least one delegation.
    pub parsed: usize,
    /// Delegations inserted across all tasks.
    pub total_instructions: usize,
    /// Index entry count after the pass.
    pub index_size: usize,
    /// Per-task failures; the pass never aborts on one.
    pub errors: Vec<(String, String)>,
    pub wall_time: std::time::Duration,
}

enum Outcome {
    Skipped {
        task_id: String,
        prefixes: Vec<String>,
    },
    Extracted {
        task_id: String,
        delegations: Vec<ExtractedDelegation>,
        checksums: BTreeMap<String, String>,
    },
    Failed {
        task_id: String,
        message: String,
    },
}

impl ReconstructionEngine {
    /// Pass 1: extract every task's sub-task delegations and index their
    /// normalised prefixes.
    ///
    /// Extraction runs in parallel; index writes and skeleton updates are
    /// applied serially in ascending task-id order, so the result equals
    /// a serial execution.
    pub fn run_pass1(
        &mut self,
        skeletons: &mut BTreeMap<String, ConversationSkeleton>,
    ) -> Pass1Metrics {
        let started = Instant::now();
        let mut metrics = Pass1Metrics::default();
        let config = self.config.clone();

        let work: Vec<&ConversationSkeleton> = skeletons
            .values()
            .filter(|s| config.in_scope(s))
            .collect();

        let outcomes: Vec<Outcome> = work
            .par_iter()
            .map(|skeleton| process_one(skeleton, &config))
            .collect();

        // Serial apply, already in ascending task-id order (BTreeMap)
        for outcome in outcomes {
            match outcome {
                Outcome::Skipped { task_id, prefixes } => {
                    metrics.skipped += 1;
                    if self.indexed_tasks.contains(&task_id) {
                        continue;
                    }
                    // A fresh index still needs the stored prefixes; the
                    // original delegation text was not persisted, so the
                    // prefix stands in for it.
                    for prefix in prefixes {
                        self.index.insert(
                            &prefix,
                            PrefixEntry {
                                task_id: task_id.clone(),
                                instruction: prefix.clone(),
                                mode: "unknown".to_string(),
                            },
                        );
                    }
                    self.indexed_tasks.insert(task_id);
                }
                Outcome::Extracted {
                    task_id,
                    delegations,
                    checksums,
                } => {
                    metrics.processed += 1;
                    if !delegations.is_empty() {
                        metrics.parsed += 1;
                    }
                    if self.indexed_tasks.contains(&task_id) {
                        // Source changed since the last run; drop the
                        // stale entries before re-inserting.
                        self.index.remove_task(&task_id);
                    }

                    let skeleton = skeletons.get_mut(&task_id).expect("work came from this map");
                    skeleton.child_task_instruction_prefixes.clear();
                    for delegation in delegations {
                        metrics.total_instructions += 1;
                        skeleton.push_child_prefix(delegation.prefix.clone());
                        self.index.insert(
                            &delegation.prefix,
                            PrefixEntry {
                                task_id: task_id.clone(),
                                instruction: delegation.content,
                                mode: delegation.mode,
                            },
                        );
                    }
                    skeleton.source_checksums = checksums;
                    skeleton.processing.phase1_done = true;
                    skeleton.processing.last_processed_at = Some(chrono::Utc::now());
                    self.indexed_tasks.insert(task_id);
                }
                Outcome::Failed { task_id, message } => {
                    if let Some(skeleton) = skeletons.get_mut(&task_id) {
                        skeleton.processing.record_error(message.clone());
                    }
                    metrics.errors.push((task_id, message));
                }
            }
        }

        metrics.index_size = self.index.len();
        metrics.wall_time = started.elapsed();
        tracing::debug!(
            processed = metrics.processed,
            skipped = metrics.skipped,
            index_size = metrics.index_size,
            "pass 1 complete"
        );
        metrics
    }
}

fn process_one(skeleton: &ConversationSkeleton, config: &super::ReconstructionConfig) -> Outcome {
    let task_id = skeleton.task_id.clone();
    let started = Instant::now();

    let detector = TaskDetector::with_root(
        skeleton
            .metadata
            .data_source
            .parent()
            .unwrap_or(&skeleton.metadata.data_source),
    );
    let manifest = match detector.probe(&skeleton.metadata.data_source) {
        Some(manifest) => manifest,
        None => {
            return Outcome::Failed {
                task_id,
                message: "task directory disappeared".to_string(),
            };
        }
    };

    let checksums = {
        let mut map = BTreeMap::new();
        for (name, path) in manifest.source_files() {
            match taskloom_providers::io::file_checksum(path) {
                Ok(checksum) => {
                    map.insert(name.to_string(), checksum);
                }
                Err(err) => {
                    return Outcome::Failed {
                        task_id,
                        message: format!("checksum failed for {}: {}", name, err),
                    };
                }
            }
        }
        map
    };

    if !config.force_rebuild
        && skeleton.processing.phase1_done
        && skeleton.source_checksums == checksums
    {
        return Outcome::Skipped {
            task_id,
            prefixes: skeleton.child_task_instruction_prefixes.clone(),
        };
    }

    let delegations = match &manifest.ui_log {
        Some(path) => match parse_ui_file(path) {
            Ok(events) => extract_delegations(&events, config.prefix_length),
            Err(err) => {
                return Outcome::Failed {
                    task_id,
                    message: format!("ui log unreadable: {}", err),
                };
            }
        },
        None => Vec::new(),
    };

    if started.elapsed() > config.operation_timeout {
        return Outcome::Failed {
            task_id,
            message: format!(
                "pass 1 exceeded operation timeout ({:?})",
                config.operation_timeout
            ),
        };
    }

    Outcome::Extracted {
        task_id,
        delegations,
        checksums,
    }
}
