use std::sync::Arc;

use serde_json::json;

use taskloom_store::{
    DecisionConfig, IndexAction, TaskActivity, TaskChunk, UpsertPipeline, decide, mark_failure,
    mark_success, sample_jitter,
};
use taskloom_types::{ContentTag, ConversationSkeleton};

use crate::Result;
use crate::cache::SkeletonCache;

#[derive(Debug, Clone)]
pub enum IndexProgress {
    Started {
        skeletons: usize,
    },
    Decided {
        task_id: String,
        action: &'static str,
        reason: String,
    },
    TaskIndexed {
        task_id: String,
        sub_chunks: usize,
        reused_from_cache: usize,
    },
    TaskFailed {
        task_id: String,
        message: String,
        permanent: bool,
    },
    /// The breaker is open; remaining tasks are left unindexed.
    BackPressure {
        task_id: String,
    },
    Completed {
        indexed: usize,
        skipped: usize,
        failed: usize,
    },
}

#[derive(Debug, Clone, Default)]
pub struct IndexSummary {
    pub indexed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub refused: usize,
}

/// Runs the indexing decision + embedding pipeline over the cache.
pub struct IndexService<'a> {
    cache: &'a mut SkeletonCache,
    pipeline: Arc<UpsertPipeline>,
    decision_config: DecisionConfig,
}

impl<'a> IndexService<'a> {
    pub fn new(
        cache: &'a mut SkeletonCache,
        pipeline: Arc<UpsertPipeline>,
        decision_config: DecisionConfig,
    ) -> Self {
        Self {
            cache,
            pipeline,
            decision_config,
        }
    }

    pub async fn run<F>(&mut self, mut on_progress: F) -> Result<IndexSummary>
    where
        F: FnMut(IndexProgress),
    {
        self.cache.ensure_fresh()?;
        self.pipeline.prepare().await?;

        on_progress(IndexProgress::Started {
            skeletons: self.cache.len(),
        });

        let task_ids: Vec<String> = self.cache.iter().map(|(id, _)| id.clone()).collect();
        let mut summary = IndexSummary::default();

        for task_id in task_ids {
            let skeleton = self.cache.get(&task_id).expect("iterating cache keys");
            let now = chrono::Utc::now();
            let decision = decide(
                skeleton.metadata.indexing_state.as_ref(),
                TaskActivity {
                    last_activity: skeleton.metadata.last_activity,
                    legacy_indexed_at: skeleton.metadata.legacy_indexed_at,
                },
                now,
                &self.decision_config,
                sample_jitter(),
            );

            let action = match decision.action {
                IndexAction::Index => "index",
                IndexAction::Retry => "retry",
                IndexAction::Skip => "skip",
            };
            on_progress(IndexProgress::Decided {
                task_id: task_id.clone(),
                action,
                reason: decision.reason.clone(),
            });

            if !decision.should_index {
                summary.skipped += 1;
                continue;
            }

            let chunks = chunks_from_skeleton(skeleton);
            match self.pipeline.index_task(&task_id, &chunks).await {
                Ok(report) => {
                    let mut skeleton = skeleton.clone();
                    mark_success(
                        &mut skeleton.metadata.indexing_state,
                        chrono::Utc::now(),
                        &self.decision_config,
                    );
                    self.cache.upsert(skeleton)?;
                    summary.indexed += 1;
                    on_progress(IndexProgress::TaskIndexed {
                        task_id,
                        sub_chunks: report.sub_chunks,
                        reused_from_cache: report.reused_from_cache,
                    });
                }
                Err(taskloom_store::Error::CircuitOpen) => {
                    // Back-pressure: the skeleton stays unindexed rather
                    // than queueing behind a store known to be down.
                    summary.refused += 1;
                    on_progress(IndexProgress::BackPressure { task_id });
                }
                Err(err) => {
                    let permanent = err.is_terminal();
                    let mut skeleton = skeleton.clone();
                    mark_failure(
                        &mut skeleton.metadata.indexing_state,
                        &err.to_string(),
                        permanent,
                        chrono::Utc::now(),
                        &self.decision_config,
                    );
                    self.cache.upsert(skeleton)?;
                    summary.failed += 1;
                    on_progress(IndexProgress::TaskFailed {
                        task_id,
                        message: err.to_string(),
                        permanent,
                    });
                }
            }
        }

        on_progress(IndexProgress::Completed {
            indexed: summary.indexed,
            skipped: summary.skipped,
            failed: summary.failed,
        });
        Ok(summary)
    }
}

/// Granular chunk extraction for one task.
///
/// The instruction plus each substantive conversation item becomes a
/// chunk; pure tool noise (calls, results) stays out of the index.
pub fn chunks_from_skeleton(skeleton: &ConversationSkeleton) -> Vec<TaskChunk> {
    let base_payload = json!({
        "workspace": skeleton.metadata.workspace,
        "title": skeleton.metadata.title,
        "mode": skeleton.metadata.mode,
        "parent_task_id": skeleton.effective_parent_id_or_null(),
        "is_completed": skeleton.is_completed,
    });

    let mut chunks = Vec::new();
    if let Some(instruction) = &skeleton.truncated_instruction {
        chunks.push(TaskChunk {
            chunk_id: format!("{}-instruction", skeleton.task_id),
            text: instruction.clone(),
            payload: base_payload.clone(),
        });
    }

    for item in &skeleton.sequence {
        let keep = matches!(
            item.tag,
            ContentTag::UserMessage | ContentTag::NewInstructions | ContentTag::Completion
        );
        if keep && !item.content.trim().is_empty() {
            chunks.push(TaskChunk {
                chunk_id: format!("{}-seq-{}", skeleton.task_id, item.original_index),
                text: item.content.clone(),
                payload: base_payload.clone(),
            });
        }
    }
    chunks
}

trait EffectiveParentJson {
    fn effective_parent_id_or_null(&self) -> serde_json::Value;
}

impl EffectiveParentJson for ConversationSkeleton {
    /// Explicit null marks "known to have no parent"; the sanitiser's
    /// allow-list keeps it.
    fn effective_parent_id_or_null(&self) -> serde_json::Value {
        match self
            .reconstructed_parent_id
            .as_deref()
            .or(self.parent_task_id.as_deref())
        {
            Some(id) => json!(id),
            None => serde_json::Value::Null,
        }
    }
}
