use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Resolve the workspace data directory path based on priority:
/// 1. Explicit path (with tilde expansion)
/// 2. TASKLOOM_PATH environment variable (with tilde expansion)
/// 3. XDG data directory (recommended default)
/// 4. ~/.taskloom (fallback for systems without XDG)
pub fn resolve_workspace_path(explicit_path: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = explicit_path {
        return Ok(expand_tilde(path));
    }

    if let Ok(env_path) = std::env::var("TASKLOOM_PATH") {
        return Ok(expand_tilde(&env_path));
    }

    if let Some(data_dir) = dirs::data_dir() {
        return Ok(data_dir.join("taskloom"));
    }

    if let Some(home) = std::env::var_os("HOME") {
        return Ok(PathBuf::from(home).join(".taskloom"));
    }

    Err(Error::Config(
        "Could not determine workspace path: no HOME directory or XDG data directory found"
            .to_string(),
    ))
}

/// Expand tilde (~) in paths to the user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return PathBuf::from(home).join(stripped);
    }
    PathBuf::from(path)
}

/// Reconstruction knobs persisted in config.toml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructionSection {
    /// `strict` or `permissive`
    #[serde(default = "default_match_mode")]
    pub mode: String,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_min_confidence")]
    pub min_confidence_score: f64,
}

fn default_match_mode() -> String {
    "strict".to_string()
}
fn default_similarity_threshold() -> f64 {
    0.2
}
fn default_min_confidence() -> f64 {
    0.3
}

impl Default for ReconstructionSection {
    fn default() -> Self {
        Self {
            mode: default_match_mode(),
            similarity_threshold: default_similarity_threshold(),
            min_confidence_score: default_min_confidence(),
        }
    }
}

/// Vector indexing knobs persisted in config.toml. Environment overrides
/// (`FORCE_REINDEX`, `INDEX_VERSION`, `VECTOR_COLLECTION_NAME`) win over
/// the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingSection {
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_model")]
    pub embedding_model: String,
    #[serde(default)]
    pub embedding_endpoint: Option<String>,
    #[serde(default)]
    pub vector_store_url: Option<String>,
    #[serde(default = "default_index_version")]
    pub index_version: u32,
    #[serde(default = "default_ttl_hours")]
    pub reindex_ttl_hours: i64,
}

fn default_collection() -> String {
    "taskloom_tasks".to_string()
}
fn default_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_index_version() -> u32 {
    1
}
fn default_ttl_hours() -> i64 {
    24
}

impl Default for IndexingSection {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            embedding_model: default_model(),
            embedding_endpoint: None,
            vector_store_url: None,
            index_version: default_index_version(),
            reindex_ttl_hours: default_ttl_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Task storage roots scanned in addition to the OS defaults.
    #[serde(default)]
    pub task_roots: Vec<PathBuf>,
    #[serde(default)]
    pub reconstruction: ReconstructionSection,
    #[serde(default)]
    pub indexing: IndexingSection,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::default_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(resolve_workspace_path(None)?.join("config.toml"))
    }

    /// Effective collection name: `VECTOR_COLLECTION_NAME` env override,
    /// else the configured one.
    pub fn collection_name(&self) -> String {
        std::env::var("VECTOR_COLLECTION_NAME").unwrap_or_else(|_| self.indexing.collection.clone())
    }

    /// Effective index version: `INDEX_VERSION` env override, else the
    /// configured one.
    pub fn index_version(&self) -> u32 {
        std::env::var("INDEX_VERSION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.indexing.index_version)
    }

    /// `FORCE_REINDEX=1`/`true` forces every task through reindexing.
    pub fn force_reindex(&self) -> bool {
        std::env::var("FORCE_REINDEX")
            .map(|v| {
                let v = v.trim();
                v == "1" || v.eq_ignore_ascii_case("true")
            })
            .unwrap_or(false)
    }

    /// Decision-service configuration with env overrides applied.
    pub fn decision_config(&self) -> taskloom_store::DecisionConfig {
        taskloom_store::DecisionConfig {
            current_index_version: self.index_version(),
            force_reindex: self.force_reindex(),
            default_ttl: chrono::Duration::hours(self.indexing.reindex_ttl_hours),
            ..Default::default()
        }
    }

    /// Engine configuration from the reconstruction section.
    pub fn reconstruction_config(&self) -> taskloom_engine::ReconstructionConfig {
        let mut config = match self.reconstruction.mode.as_str() {
            "permissive" => taskloom_engine::ReconstructionConfig::permissive(),
            _ => taskloom_engine::ReconstructionConfig::default(),
        };
        config.similarity_threshold = self.reconstruction.similarity_threshold;
        config.min_confidence_score = self.reconstruction.min_confidence_score;
        config
    }
}
