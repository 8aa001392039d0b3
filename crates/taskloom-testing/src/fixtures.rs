use std::path::{Path, PathBuf};

use anyhow::Result;
use serde_json::json;

/// Deterministic UUID-shaped task id for tests. `task_id(7)` always
/// yields the same id, and ids sort by their argument.
pub fn task_id(n: u32) -> String {
    format!("00000000-0000-4000-8000-{:012}", n)
}

/// Builder for one synthetic task directory: agent-exchange log,
/// UI-event log, optional sidecar metadata.
#[derive(Debug, Clone)]
pub struct TaskFixture {
    task_id: String,
    instruction: Option<String>,
    delegations: Vec<(String, String)>,
    recorded_parent: Option<String>,
    workspace: Option<String>,
    created_at_ms: i64,
    completed: bool,
    skip_exchange_log: bool,
}

impl TaskFixture {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            instruction: None,
            delegations: Vec::new(),
            recorded_parent: None,
            workspace: None,
            created_at_ms: 1_735_732_800_000, // 2025-01-01T12:00:00Z
            completed: false,
            skip_exchange_log: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.task_id
    }

    /// The first user message of the task.
    pub fn instruction(mut self, text: impl Into<String>) -> Self {
        self.instruction = Some(text.into());
        self
    }

    /// Add a `newTask` delegation to the UI log.
    pub fn delegates(mut self, mode: impl Into<String>, content: impl Into<String>) -> Self {
        self.delegations.push((mode.into(), content.into()));
        self
    }

    /// Record a parent pointer in the sidecar metadata.
    pub fn recorded_parent(mut self, parent: impl Into<String>) -> Self {
        self.recorded_parent = Some(parent.into());
        self
    }

    pub fn workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    pub fn created_at_ms(mut self, ms: i64) -> Self {
        self.created_at_ms = ms;
        self
    }

    /// End the conversation with an attempt_completion marker.
    pub fn completed(mut self) -> Self {
        self.completed = true;
        self
    }

    /// Omit the agent-exchange log so only the UI path exists.
    pub fn without_exchange_log(mut self) -> Self {
        self.skip_exchange_log = true;
        self
    }

    /// Write the task directory under `tasks_root` and return its path.
    pub fn write_to(&self, tasks_root: &Path) -> Result<PathBuf> {
        let dir = tasks_root.join(&self.task_id);
        std::fs::create_dir_all(&dir)?;

        if !self.skip_exchange_log {
            let mut messages = Vec::new();
            if let Some(instruction) = &self.instruction {
                messages.push(json!({
                    "role": "user",
                    "content": format!("<task>\n{}\n</task>", instruction),
                    "timestamp": self.created_at_ms,
                }));
            }
            let closing = if self.completed {
                "<attempt_completion>\n<result>Done.</result>\n</attempt_completion>"
            } else {
                "Working on it."
            };
            messages.push(json!({
                "role": "assistant",
                "content": closing,
                "timestamp": self.created_at_ms + 60_000,
            }));
            std::fs::write(
                dir.join("api_conversation_history.json"),
                serde_json::to_vec_pretty(&messages)?,
            )?;
        }

        let mut ui_events = vec![json!({
            "ts": self.created_at_ms,
            "type": "say",
            "say": "text",
            "text": "Task started",
        })];
        for (n, (mode, content)) in self.delegations.iter().enumerate() {
            let payload = json!({"tool": "newTask", "mode": mode, "content": content});
            ui_events.push(json!({
                "ts": self.created_at_ms + 10_000 + n as i64 * 1000,
                "type": "ask",
                "ask": "tool",
                "text": payload.to_string(),
            }));
        }
        std::fs::write(
            dir.join("ui_messages.json"),
            serde_json::to_vec_pretty(&ui_events)?,
        )?;

        if self.recorded_parent.is_some() || self.workspace.is_some() {
            let mut metadata = serde_json::Map::new();
            if let Some(parent) = &self.recorded_parent {
                metadata.insert("parentTaskId".to_string(), json!(parent));
            }
            if let Some(workspace) = &self.workspace {
                metadata.insert("workspace".to_string(), json!(workspace));
            }
            std::fs::write(
                dir.join("task_metadata.json"),
                serde_json::to_vec_pretty(&serde_json::Value::Object(metadata))?,
            )?;
        }

        Ok(dir)
    }
}
