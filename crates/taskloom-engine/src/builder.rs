use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use taskloom_providers::{
    MessageEvent, TaskDirManifest, TaskMetadataFile, UiEvent, io as provider_io,
    parse_exchange_file, parse_metadata_file, parse_ui_file,
};
use taskloom_types::{
    Actor, ContentTag, ConversationSkeleton, PREFIX_LENGTH, SkeletonMetadata, truncate,
};

use crate::classify::{classify_messages, classify_ui_events};
use crate::instructions::extract_delegations;
use crate::normalize::{is_substantial, normalize_prefix};

const TITLE_MAX_CHARS: usize = 80;

static CWD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)current working directory[^:\n]*:?\s*\(?['\x60]?([^'\x60)\n]+)").unwrap()
});

/// Result of a build attempt for one task directory.
#[derive(Debug)]
pub enum BuildOutcome {
    /// Checksums unchanged; the stored skeleton is still current.
    Unchanged,
    /// A fresh skeleton was produced.
    Built(Box<ConversationSkeleton>),
}

/// Builds [`ConversationSkeleton`]s from task directories.
///
/// Building is idempotent: when the stored checksums match the on-disk
/// files and the previous build completed, the stored skeleton is kept.
#[derive(Debug, Clone)]
pub struct SkeletonBuilder {
    prefix_length: usize,
}

impl Default for SkeletonBuilder {
    fn default() -> Self {
        Self {
            prefix_length: PREFIX_LENGTH,
        }
    }
}

impl SkeletonBuilder {
    pub fn new(prefix_length: usize) -> Self {
        Self { prefix_length }
    }

    /// Build (or confirm) the skeleton for one task directory.
    ///
    /// Whole-file parse failures degrade to a partially built skeleton
    /// with the failure recorded in `processing.errors`; only directory
    /// level problems surface as `Err`.
    pub fn build(
        &self,
        manifest: &TaskDirManifest,
        existing: Option<&ConversationSkeleton>,
        force: bool,
    ) -> taskloom_providers::Result<BuildOutcome> {
        let checksums = source_checksums(manifest);

        if !force
            && let Some(prev) = existing
            && prev.processing.phase1_done
            && prev.source_checksums == checksums
        {
            return Ok(BuildOutcome::Unchanged);
        }

        let now = Utc::now();
        let mut skeleton = ConversationSkeleton::new(
            manifest.task_id.clone(),
            SkeletonMetadata::new(manifest.directory.clone(), now),
        );
        skeleton.source_checksums = checksums;

        // Sidecar metadata seeds the recorded parent and workspace
        let sidecar = self.read_sidecar(manifest, &mut skeleton);

        // Agent-exchange log: the primary classified stream
        let messages = match &manifest.exchange_log {
            Some(path) => match parse_exchange_file(path) {
                Ok(messages) => messages,
                Err(err) => {
                    skeleton
                        .processing
                        .record_error(format!("exchange log unreadable: {}", err));
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        // UI log: delegation source, fallback classified stream
        let ui_events = match &manifest.ui_log {
            Some(path) => match parse_ui_file(path) {
                Ok(events) => events,
                Err(err) => {
                    skeleton
                        .processing
                        .record_error(format!("ui log unreadable: {}", err));
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        skeleton.sequence = if messages.is_empty() {
            classify_ui_events(&ui_events)
        } else {
            classify_messages(&messages)
        };

        self.fill_instruction(&mut skeleton);
        fill_timestamps(&mut skeleton, &messages, &ui_events, now);
        self.fill_workspace(&mut skeleton, sidecar.as_ref(), &messages);

        // Per-delegation modes live in the instruction index; the
        // skeleton keeps prefixes only.
        for delegation in extract_delegations(&ui_events, self.prefix_length) {
            skeleton.push_child_prefix(delegation.prefix);
        }
        skeleton.metadata.mode = sidecar.as_ref().and_then(|s| s.mode.clone());

        skeleton.metadata.message_count = skeleton.sequence.len();
        skeleton.metadata.action_count = ui_events.len();
        skeleton.metadata.total_size = manifest.total_size();

        skeleton.is_completed = skeleton
            .sequence
            .iter()
            .rev()
            .find(|item| item.actor == Actor::Assistant)
            .is_some_and(|item| item.tag == ContentTag::Completion);

        skeleton.processing.phase1_done = false; // pass 1 owns this flag
        skeleton.processing.last_processed_at = Some(now);

        Ok(BuildOutcome::Built(Box::new(skeleton)))
    }

    fn read_sidecar(
        &self,
        manifest: &TaskDirManifest,
        skeleton: &mut ConversationSkeleton,
    ) -> Option<TaskMetadataFile> {
        let path = manifest.metadata_file.as_ref()?;
        match parse_metadata_file(path) {
            Ok(sidecar) => {
                skeleton.parent_task_id = sidecar.parent_task_id.clone();
                if let Some(title) = &sidecar.title {
                    skeleton.metadata.title = Some(truncate(title, TITLE_MAX_CHARS));
                }
                Some(sidecar)
            }
            Err(err) => {
                skeleton
                    .processing
                    .record_error(format!("task metadata unreadable: {}", err));
                None
            }
        }
    }

    /// First substantial user message becomes the truncated instruction
    /// and, line one of it, the title.
    fn fill_instruction(&self, skeleton: &mut ConversationSkeleton) {
        let found = skeleton
            .sequence
            .iter()
            .filter(|item| item.tag == ContentTag::UserMessage)
            .find_map(|item| {
                let stripped = strip_tag_lines(&item.content);
                (stripped.chars().count() >= 10).then_some(stripped)
            });

        if let Some(text) = found {
            let prefix = normalize_prefix(&text, self.prefix_length);
            if is_substantial(&prefix) {
                if skeleton.metadata.title.is_none() {
                    let first_line = text.lines().next().unwrap_or_default();
                    skeleton.metadata.title = Some(truncate(first_line, TITLE_MAX_CHARS));
                }
                skeleton.truncated_instruction = Some(prefix);
            }
        }
    }

    /// Workspace precedence: sidecar field, tool payload paths, body
    /// regex, nothing.
    fn fill_workspace(
        &self,
        skeleton: &mut ConversationSkeleton,
        sidecar: Option<&TaskMetadataFile>,
        messages: &[MessageEvent],
    ) {
        if let Some(workspace) = sidecar.and_then(|s| s.workspace.clone()) {
            skeleton.metadata.workspace = Some(workspace);
            return;
        }

        for message in messages {
            for tool_use in &message.tool_uses {
                if let Some(cwd) = tool_use.input.get("cwd").and_then(|v| v.as_str()) {
                    skeleton.metadata.workspace = Some(cwd.to_string());
                    return;
                }
                if let Some(path) = tool_use.input.get("path").and_then(|v| v.as_str())
                    && let Some(parent) = std::path::Path::new(path).parent()
                    && parent.is_absolute()
                {
                    skeleton.metadata.workspace = Some(parent.display().to_string());
                    return;
                }
            }
        }

        for message in messages {
            if let Some(caps) = CWD_RE.captures(&message.text) {
                skeleton.metadata.workspace = Some(caps[1].trim().to_string());
                return;
            }
        }
    }
}

fn source_checksums(manifest: &TaskDirManifest) -> BTreeMap<String, String> {
    let mut checksums = BTreeMap::new();
    for (name, path) in manifest.source_files() {
        if let Ok(checksum) = provider_io::file_checksum(path) {
            checksums.insert(name.to_string(), checksum);
        }
    }
    checksums
}

fn fill_timestamps(
    skeleton: &mut ConversationSkeleton,
    messages: &[MessageEvent],
    ui_events: &[UiEvent],
    now: DateTime<Utc>,
) {
    let all = messages
        .iter()
        .filter_map(|m| m.timestamp)
        .chain(ui_events.iter().filter_map(|e| e.timestamp));

    let (mut min, mut max) = (None, None);
    for ts in all {
        min = Some(min.map_or(ts, |m: DateTime<Utc>| m.min(ts)));
        max = Some(max.map_or(ts, |m: DateTime<Utc>| m.max(ts)));
    }

    skeleton.metadata.created_at = min.unwrap_or(now);
    skeleton.metadata.last_activity = max.unwrap_or(now);
}

/// Drop surrounding lines that are bare tags (`<task>`, `[context]`, …)
/// so the instruction-length rule measures actual prose.
fn strip_tag_lines(text: &str) -> String {
    fn is_tag_line(line: &str) -> bool {
        let trimmed = line.trim();
        trimmed.is_empty()
            || (trimmed.starts_with('<') && trimmed.ends_with('>') && !trimmed.contains(' '))
            || (trimmed.starts_with('[') && trimmed.ends_with(']') && trimmed.len() <= 40)
    }

    let lines: Vec<&str> = text.lines().collect();
    let start = lines.iter().position(|l| !is_tag_line(l)).unwrap_or(lines.len());
    let end = lines.iter().rposition(|l| !is_tag_line(l)).map_or(start, |i| i + 1);
    let joined = lines[start..end].join("\n");

    // Inline <task>...</task> wrappers: keep the payload only
    static TASK_WRAPPER: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?s)^\s*<task>\s*(.*?)\s*</task>").unwrap());
    if let Some(caps) = TASK_WRAPPER.captures(&joined) {
        return caps[1].trim().to_string();
    }
    joined.trim().to_string()
}
