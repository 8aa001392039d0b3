use taskloom_engine::{Pass1Metrics, Pass2Metrics, ReconstructionConfig, ReconstructionEngine};
use taskloom_types::ResolutionMethod;

use crate::Result;
use crate::cache::SkeletonCache;

#[derive(Debug, Clone)]
pub enum ReconstructProgress {
    Pass1Started {
        skeletons: usize,
    },
    Pass1Completed {
        processed: usize,
        skipped: usize,
        index_size: usize,
        errors: usize,
    },
    Pass2Started,
    Pass2Completed {
        resolved: usize,
        unresolved: usize,
        roots: usize,
    },
    Persisted {
        skeletons: usize,
    },
}

#[derive(Debug, Clone)]
pub struct ReconstructSummary {
    pub pass1: Pass1Metrics,
    pub pass2: Pass2Metrics,
    /// (task_id, method, confidence, parent) for every resolved orphan.
    pub resolutions: Vec<(String, ResolutionMethod, f64, String)>,
}

/// Drives the two-pass engine over the cached skeleton set and persists
/// the outcome.
pub struct ReconstructService<'a> {
    cache: &'a mut SkeletonCache,
    engine: ReconstructionEngine,
}

impl<'a> ReconstructService<'a> {
    pub fn new(cache: &'a mut SkeletonCache, config: ReconstructionConfig) -> Self {
        Self {
            cache,
            engine: ReconstructionEngine::new(config),
        }
    }

    pub fn run<F>(&mut self, mut on_progress: F) -> Result<ReconstructSummary>
    where
        F: FnMut(ReconstructProgress),
    {
        self.cache.ensure_fresh()?;

        on_progress(ReconstructProgress::Pass1Started {
            skeletons: self.cache.len(),
        });
        let pass1 = self.engine.run_pass1(self.cache.skeletons_mut());
        on_progress(ReconstructProgress::Pass1Completed {
            processed: pass1.processed,
            skipped: pass1.skipped,
            index_size: pass1.index_size,
            errors: pass1.errors.len(),
        });

        on_progress(ReconstructProgress::Pass2Started);
        let pass2 = self.engine.run_pass2(self.cache.skeletons_mut());
        on_progress(ReconstructProgress::Pass2Completed {
            resolved: pass2.resolved,
            unresolved: pass2.unresolved,
            roots: pass2.roots_detected,
        });

        self.cache.persist_all()?;
        on_progress(ReconstructProgress::Persisted {
            skeletons: self.cache.len(),
        });

        let resolutions = self
            .engine
            .overlay()
            .iter()
            .filter_map(|(task_id, resolution)| {
                let parent = resolution.reconstructed_parent_id.clone()?;
                let method = resolution.method?;
                Some((task_id.clone(), method, resolution.confidence, parent))
            })
            .collect();

        Ok(ReconstructSummary {
            pass1,
            pass2,
            resolutions,
        })
    }

    pub fn engine(&self) -> &ReconstructionEngine {
        &self.engine
    }
}
