use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use taskloom_types::ConversationSkeleton;

use crate::Result;

/// Directory holding one skeleton JSON per task, parallel to the task
/// directories themselves.
pub const SKELETON_DIR_NAME: &str = ".skeletons";

/// Aggregate counters for the CLI stats view.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CacheStats {
    pub skeletons: usize,
    pub roots: usize,
    pub with_recorded_parent: usize,
    pub with_reconstructed_parent: usize,
    pub completed: usize,
    pub total_size: u64,
}

/// Process-resident skeleton cache (task id → skeleton) with JSON file
/// persistence.
///
/// Readers get shared references; writers replace whole skeletons, and
/// every write lands on disk atomically (tmp + rename) before the map is
/// updated.
pub struct SkeletonCache {
    dir: PathBuf,
    skeletons: BTreeMap<String, ConversationSkeleton>,
    /// mtime per task id at load time, for `ensure_fresh`.
    mtimes: HashMap<String, SystemTime>,
}

impl SkeletonCache {
    /// Open (and create) the skeleton directory under a tasks root.
    pub fn open(tasks_root: &Path) -> Result<Self> {
        let dir = tasks_root.join(SKELETON_DIR_NAME);
        std::fs::create_dir_all(&dir)?;

        let mut cache = Self {
            dir,
            skeletons: BTreeMap::new(),
            mtimes: HashMap::new(),
        };
        cache.reload_all()?;
        Ok(cache)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.skeletons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skeletons.is_empty()
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.skeletons.contains_key(task_id)
    }

    pub fn get(&self, task_id: &str) -> Option<&ConversationSkeleton> {
        self.skeletons.get(task_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ConversationSkeleton)> {
        self.skeletons.iter()
    }

    /// Borrow the whole map; the reconstruction engine works on it
    /// directly.
    pub fn skeletons(&self) -> &BTreeMap<String, ConversationSkeleton> {
        &self.skeletons
    }

    pub fn skeletons_mut(&mut self) -> &mut BTreeMap<String, ConversationSkeleton> {
        &mut self.skeletons
    }

    /// Insert or replace a skeleton, persisting it first.
    pub fn upsert(&mut self, skeleton: ConversationSkeleton) -> Result<()> {
        self.persist(&skeleton)?;
        let path = self.skeleton_path(&skeleton.task_id);
        if let Ok(meta) = std::fs::metadata(&path)
            && let Ok(mtime) = meta.modified()
        {
            self.mtimes.insert(skeleton.task_id.clone(), mtime);
        }
        self.skeletons.insert(skeleton.task_id.clone(), skeleton);
        Ok(())
    }

    /// Write every in-memory skeleton back to disk. Used after a pass
    /// mutated the map in place.
    pub fn persist_all(&mut self) -> Result<()> {
        let ids: Vec<String> = self.skeletons.keys().cloned().collect();
        for task_id in ids {
            let skeleton = self.skeletons.get(&task_id).expect("iterating keys").clone();
            self.persist(&skeleton)?;
            let path = self.skeleton_path(&task_id);
            if let Ok(meta) = std::fs::metadata(&path)
                && let Ok(mtime) = meta.modified()
            {
                self.mtimes.insert(task_id, mtime);
            }
        }
        Ok(())
    }

    /// Freshness contract: after this returns, any on-disk change since
    /// the previous call is reflected in the map. Uses mtime scans.
    pub fn ensure_fresh(&mut self) -> Result<usize> {
        let mut refreshed = 0;
        let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            let Some(task_id) = skeleton_task_id(&path) else {
                continue;
            };
            seen.insert(task_id.clone());

            let mtime = entry.metadata().ok().and_then(|m| m.modified().ok());
            let known = self.mtimes.get(&task_id);
            let changed = match (known, mtime) {
                (Some(old), Some(new)) => *old != new,
                (None, _) => true,
                (_, None) => true,
            };

            if changed {
                match self.load_one(&path) {
                    Ok(skeleton) => {
                        if let Some(new_mtime) = mtime {
                            self.mtimes.insert(task_id.clone(), new_mtime);
                        }
                        self.skeletons.insert(task_id, skeleton);
                        refreshed += 1;
                    }
                    Err(err) => {
                        // A malformed skeleton is omitted, never fatal
                        tracing::warn!(path = %path.display(), %err, "skipping unreadable skeleton");
                        self.skeletons.remove(&task_id);
                        self.mtimes.remove(&task_id);
                    }
                }
            }
        }

        // Drop entries whose files disappeared
        let gone: Vec<String> = self
            .skeletons
            .keys()
            .filter(|id| !seen.contains(*id))
            .cloned()
            .collect();
        for task_id in gone {
            self.skeletons.remove(&task_id);
            self.mtimes.remove(&task_id);
            refreshed += 1;
        }

        Ok(refreshed)
    }

    /// Wipe the in-memory generation and re-read everything from disk.
    pub fn reload_all(&mut self) -> Result<()> {
        self.skeletons.clear();
        self.mtimes.clear();
        self.ensure_fresh()?;
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            skeletons: self.skeletons.len(),
            ..Default::default()
        };
        for skeleton in self.skeletons.values() {
            if skeleton.reconstructed_parent_id.is_some() {
                stats.with_reconstructed_parent += 1;
            } else if skeleton.parent_task_id.is_some() {
                stats.with_recorded_parent += 1;
            } else {
                stats.roots += 1;
            }
            if skeleton.is_completed {
                stats.completed += 1;
            }
            stats.total_size += skeleton.metadata.total_size;
        }
        stats
    }

    pub fn skeleton_path(&self, task_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", task_id))
    }

    fn persist(&self, skeleton: &ConversationSkeleton) -> Result<()> {
        let path = self.skeleton_path(&skeleton.task_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(skeleton)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn load_one(&self, path: &Path) -> Result<ConversationSkeleton> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

fn skeleton_task_id(path: &Path) -> Option<String> {
    if path.extension()? != "json" {
        return None;
    }
    Some(path.file_stem()?.to_str()?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use taskloom_types::SkeletonMetadata;

    fn skeleton(id: &str) -> ConversationSkeleton {
        ConversationSkeleton::new(
            id,
            SkeletonMetadata::new(PathBuf::from(format!("/tasks/{}", id)), Utc::now()),
        )
    }

    #[test]
    fn upsert_persists_and_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let mut cache = SkeletonCache::open(tmp.path()).unwrap();
            cache.upsert(skeleton("task-a")).unwrap();
            cache.upsert(skeleton("task-b")).unwrap();
            assert_eq!(cache.len(), 2);
        }

        let cache = SkeletonCache::open(tmp.path()).unwrap();
        assert_eq!(cache.len(), 2);
        assert!(cache.contains("task-a"));
    }

    #[test]
    fn ensure_fresh_picks_up_external_writes() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cache = SkeletonCache::open(tmp.path()).unwrap();
        assert_eq!(cache.len(), 0);

        // A second process drops a skeleton file in
        let mut other = SkeletonCache::open(tmp.path()).unwrap();
        other.upsert(skeleton("task-x")).unwrap();

        cache.ensure_fresh().unwrap();
        assert!(cache.contains("task-x"));
    }

    #[test]
    fn ensure_fresh_drops_deleted_files() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cache = SkeletonCache::open(tmp.path()).unwrap();
        cache.upsert(skeleton("task-a")).unwrap();

        std::fs::remove_file(cache.skeleton_path("task-a")).unwrap();
        cache.ensure_fresh().unwrap();
        assert!(!cache.contains("task-a"));
    }

    #[test]
    fn malformed_skeleton_is_omitted_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cache = SkeletonCache::open(tmp.path()).unwrap();
        std::fs::write(cache.dir().join("broken.json"), "not json").unwrap();

        cache.ensure_fresh().unwrap();
        assert!(!cache.contains("broken"));
    }

    #[test]
    fn stats_classify_parents() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cache = SkeletonCache::open(tmp.path()).unwrap();

        let root = skeleton("root");
        let mut recorded = skeleton("rec");
        recorded.parent_task_id = Some("root".into());
        let mut rebuilt = skeleton("reb");
        rebuilt.reconstructed_parent_id = Some("root".into());
        rebuilt.is_completed = true;

        cache.upsert(root).unwrap();
        cache.upsert(recorded).unwrap();
        cache.upsert(rebuilt).unwrap();

        let stats = cache.stats();
        assert_eq!(stats.skeletons, 3);
        assert_eq!(stats.roots, 1);
        assert_eq!(stats.with_recorded_parent, 1);
        assert_eq!(stats.with_reconstructed_parent, 1);
        assert_eq!(stats.completed, 1);
    }
}
