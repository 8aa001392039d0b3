use taskloom_engine::{BuildOutcome, SkeletonBuilder};
use taskloom_providers::TaskDetector;

use crate::Result;
use crate::cache::SkeletonCache;

#[derive(Debug, Clone)]
pub enum BuildProgress {
    ScanStarted {
        roots: usize,
    },
    TasksDiscovered {
        count: usize,
    },
    SkeletonBuilt {
        task_id: String,
    },
    SkeletonUnchanged {
        task_id: String,
    },
    TaskFailed {
        task_id: String,
        message: String,
    },
    Completed {
        built: usize,
        unchanged: usize,
        failed: usize,
    },
}

#[derive(Debug, Clone, Default)]
pub struct BuildSummary {
    pub discovered: usize,
    pub built: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Scans task storage and (re)builds skeletons into the cache.
pub struct BuildService<'a> {
    cache: &'a mut SkeletonCache,
    detector: TaskDetector,
    builder: SkeletonBuilder,
}

impl<'a> BuildService<'a> {
    pub fn new(cache: &'a mut SkeletonCache, detector: TaskDetector) -> Self {
        Self {
            cache,
            detector,
            builder: SkeletonBuilder::default(),
        }
    }

    pub fn run<F>(&mut self, force: bool, mut on_progress: F) -> Result<BuildSummary>
    where
        F: FnMut(BuildProgress),
    {
        on_progress(BuildProgress::ScanStarted {
            roots: self.detector.roots().len(),
        });

        let manifests = self.detector.scan()?;
        let mut summary = BuildSummary {
            discovered: manifests.len(),
            ..Default::default()
        };
        on_progress(BuildProgress::TasksDiscovered {
            count: manifests.len(),
        });

        for manifest in manifests {
            let existing = self.cache.get(&manifest.task_id);
            match self.builder.build(&manifest, existing, force) {
                Ok(BuildOutcome::Unchanged) => {
                    summary.unchanged += 1;
                    on_progress(BuildProgress::SkeletonUnchanged {
                        task_id: manifest.task_id,
                    });
                }
                Ok(BuildOutcome::Built(skeleton)) => {
                    self.cache.upsert(*skeleton)?;
                    summary.built += 1;
                    on_progress(BuildProgress::SkeletonBuilt {
                        task_id: manifest.task_id,
                    });
                }
                Err(err) => {
                    // One broken directory never aborts the batch
                    summary.failed += 1;
                    on_progress(BuildProgress::TaskFailed {
                        task_id: manifest.task_id,
                        message: err.to_string(),
                    });
                }
            }
        }

        on_progress(BuildProgress::Completed {
            built: summary.built,
            unchanged: summary.unchanged,
            failed: summary.failed,
        });
        Ok(summary)
    }
}
