use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use assert_cmd::Command;
use tempfile::TempDir;

use crate::fixtures::TaskFixture;

/// Isolated test environment: a temp directory with a tasks root and a
/// data dir, plus helpers to run the CLI against them.
pub struct TestWorld {
    temp_dir: TempDir,
    tasks_root: PathBuf,
    data_dir: PathBuf,
    env_vars: HashMap<String, String>,
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorld {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let tasks_root = temp_dir.path().join("tasks");
        let data_dir = temp_dir.path().join(".taskloom");
        std::fs::create_dir_all(&tasks_root).expect("Failed to create tasks root");
        std::fs::create_dir_all(&data_dir).expect("Failed to create data dir");

        Self {
            temp_dir,
            tasks_root,
            data_dir,
            env_vars: HashMap::new(),
        }
    }

    pub fn tasks_root(&self) -> &Path {
        &self.tasks_root
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Set an environment variable for CLI execution.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    /// Materialise a task fixture under the tasks root.
    pub fn add_task(&self, fixture: TaskFixture) -> Result<PathBuf> {
        fixture.write_to(&self.tasks_root)
    }

    /// Run the taskloom binary with this world's roots wired in.
    pub fn run(&self, args: &[&str]) -> Result<CliResult> {
        let mut cmd = Command::cargo_bin("taskloom")
            .map_err(|e| anyhow::anyhow!("Failed to find taskloom binary: {}", e))?;

        cmd.arg("--tasks-root")
            .arg(&self.tasks_root)
            .env("TASKLOOM_PATH", &self.data_dir);
        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }
        cmd.args(args);

        let output = cmd.output()?;
        Ok(CliResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Result of a CLI command execution.
#[derive(Debug)]
pub struct CliResult {
    pub status: std::process::ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CliResult {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.stdout)?)
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }
}
