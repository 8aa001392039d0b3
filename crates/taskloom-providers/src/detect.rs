use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::{EXCHANGE_LOG_FILE, Result, TASK_METADATA_FILE, UI_LOG_FILE};

/// File-set manifest for one discovered task directory.
///
/// Discovery never reads file bodies; sizes come from directory metadata.
#[derive(Debug, Clone)]
pub struct TaskDirManifest {
    pub task_id: String,
    pub directory: PathBuf,
    pub exchange_log: Option<PathBuf>,
    pub ui_log: Option<PathBuf>,
    pub metadata_file: Option<PathBuf>,
}

impl TaskDirManifest {
    /// Paths of the source log files present, with their canonical names.
    pub fn source_files(&self) -> Vec<(&'static str, &Path)> {
        let mut files = Vec::new();
        if let Some(p) = &self.exchange_log {
            files.push((EXCHANGE_LOG_FILE, p.as_path()));
        }
        if let Some(p) = &self.ui_log {
            files.push((UI_LOG_FILE, p.as_path()));
        }
        if let Some(p) = &self.metadata_file {
            files.push((TASK_METADATA_FILE, p.as_path()));
        }
        files
    }

    /// Combined size of all present files, in bytes.
    pub fn total_size(&self) -> u64 {
        self.source_files()
            .iter()
            .map(|(_, p)| crate::io::file_size(p))
            .sum()
    }
}

/// Discovers task directories under one or more storage roots.
pub struct TaskDetector {
    roots: Vec<PathBuf>,
}

impl TaskDetector {
    /// Detector over explicit roots plus, when `include_defaults` is set,
    /// the OS-specific default locations that exist on this machine.
    pub fn new(overrides: Vec<PathBuf>, include_defaults: bool) -> Self {
        let mut roots = overrides;
        if include_defaults {
            for root in get_default_task_roots() {
                if !roots.contains(&root) {
                    roots.push(root);
                }
            }
        }
        Self { roots }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self::new(vec![root.into()], false)
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Check whether a directory is a usable task directory: task-id
    /// shaped name and at least one of the two log files.
    pub fn probe(&self, dir: &Path) -> Option<TaskDirManifest> {
        if !dir.is_dir() {
            return None;
        }
        let name = dir.file_name()?.to_str()?;
        if !taskloom_types::is_task_id_shape(name) {
            return None;
        }

        let exchange = existing(dir.join(EXCHANGE_LOG_FILE));
        let ui = existing(dir.join(UI_LOG_FILE));
        if exchange.is_none() && ui.is_none() {
            return None;
        }

        Some(TaskDirManifest {
            task_id: name.to_string(),
            directory: dir.to_path_buf(),
            exchange_log: exchange,
            ui_log: ui,
            metadata_file: existing(dir.join(TASK_METADATA_FILE)),
        })
    }

    /// Enumerate all task directories under the configured roots.
    ///
    /// Duplicate task ids across roots keep the first hit; roots are
    /// scanned in configuration order so overrides win over defaults.
    pub fn scan(&self) -> Result<Vec<TaskDirManifest>> {
        let mut manifests: Vec<TaskDirManifest> = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for root in &self.roots {
            if !root.is_dir() {
                tracing::debug!(root = %root.display(), "task root missing, skipping");
                continue;
            }

            for entry in WalkDir::new(root)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if let Some(manifest) = self.probe(entry.path())
                    && seen.insert(manifest.task_id.clone())
                {
                    manifests.push(manifest);
                }
            }
        }

        // Deterministic output regardless of directory iteration order
        manifests.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        Ok(manifests)
    }

    /// Locate a single task directory by id across the configured roots.
    pub fn find_task(&self, task_id: &str) -> Option<TaskDirManifest> {
        self.roots
            .iter()
            .find_map(|root| self.probe(&root.join(task_id)))
    }
}

/// OS-specific default locations for task storage.
///
/// Agent sessions live under the host editor's global storage; both the
/// current and the legacy extension ids are checked.
pub fn get_default_task_roots() -> Vec<PathBuf> {
    const STORAGE_KEYS: &[&str] = &["saoudrizwan.claude-dev", "rooveterinaryinc.roo-cline"];

    let mut roots = Vec::new();
    if let Ok(env_root) = std::env::var("TASKLOOM_TASKS_ROOT") {
        roots.push(PathBuf::from(env_root));
    }

    if let Some(config) = dirs::config_dir() {
        for key in STORAGE_KEYS {
            roots.push(
                config
                    .join("Code")
                    .join("User")
                    .join("globalStorage")
                    .join(key)
                    .join("tasks"),
            );
        }
    }

    roots
}

fn existing(path: PathBuf) -> Option<PathBuf> {
    path.is_file().then_some(path)
}
