use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use taskloom_types::{
    ARCHIVE_MESSAGE_MAX_BYTES, ARCHIVE_SCHEMA_VERSION, Actor, ArchivedMessage, ArchivedTask,
    ConversationSkeleton, TRUNCATION_MARKER, truncate_bytes,
};

use crate::{Error, Result};

/// Writes canonical task archives: gzip-compressed JSON, one file per
/// task, addressed by `{machine_id, task_id}`.
pub struct ArchiveWriter {
    base_dir: PathBuf,
    machine_id: String,
    host_identifier: String,
}

impl ArchiveWriter {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        machine_id: impl Into<String>,
        host_identifier: impl Into<String>,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            machine_id: machine_id.into(),
            host_identifier: host_identifier.into(),
        }
    }

    /// Archive one skeleton. Message bodies are capped at 10 KiB with a
    /// literal truncation marker.
    pub fn write(&self, skeleton: &ConversationSkeleton) -> Result<PathBuf> {
        let messages = skeleton
            .sequence
            .iter()
            .map(|item| ArchivedMessage {
                role: match item.actor {
                    Actor::User => "user".to_string(),
                    Actor::Assistant => "assistant".to_string(),
                },
                content: truncate_bytes(&item.content, ARCHIVE_MESSAGE_MAX_BYTES, TRUNCATION_MARKER),
                timestamp: item.timestamp,
            })
            .collect();

        let archived = ArchivedTask {
            version: ARCHIVE_SCHEMA_VERSION,
            task_id: skeleton.task_id.clone(),
            machine_id: self.machine_id.clone(),
            host_identifier: self.host_identifier.clone(),
            archived_at: chrono::Utc::now(),
            metadata: skeleton.metadata.clone(),
            messages,
        };

        let dir = self.base_dir.join(&self.machine_id);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.json.gz", skeleton.task_id));

        let file = std::fs::File::create(&path)?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(&serde_json::to_vec(&archived)?)?;
        encoder.finish()?;
        Ok(path)
    }
}

/// Reads archives from a shared base directory populated by any number
/// of machines.
pub struct ArchiveReader {
    base_dir: PathBuf,
}

impl ArchiveReader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Find a task's archive: first hit across machine subdirectories,
    /// scanned in lexicographic order for determinism.
    pub fn find(&self, task_id: &str) -> Result<Option<ArchivedTask>> {
        for machine_dir in self.machine_dirs()? {
            let path = machine_dir.join(format!("{}.json.gz", task_id));
            if path.is_file() {
                return Ok(Some(self.read_file(&path)?));
            }
        }
        Ok(None)
    }

    /// Enumerate all `{machine_id, task_id}` pairs under the base dir.
    pub fn list(&self) -> Result<Vec<(String, String)>> {
        let mut entries = Vec::new();
        for machine_dir in self.machine_dirs()? {
            let machine_id = machine_dir
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            for entry in std::fs::read_dir(&machine_dir)? {
                let path = entry?.path();
                if let Some(name) = path.file_name().and_then(|n| n.to_str())
                    && let Some(task_id) = name.strip_suffix(".json.gz")
                {
                    entries.push((machine_id.clone(), task_id.to_string()));
                }
            }
        }
        entries.sort();
        Ok(entries)
    }

    pub fn read_file(&self, path: &Path) -> Result<ArchivedTask> {
        let file = std::fs::File::open(path)?;
        let mut decoder = GzDecoder::new(file);
        let mut json = Vec::new();
        decoder.read_to_end(&mut json)?;

        let archived: ArchivedTask = serde_json::from_slice(&json)?;
        if !archived.is_supported_version() {
            return Err(Error::InvalidOperation(format!(
                "unsupported archive version {} in {}",
                archived.version,
                path.display()
            )));
        }
        Ok(archived)
    }

    fn machine_dirs(&self) -> Result<Vec<PathBuf>> {
        if !self.base_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut dirs: Vec<PathBuf> = std::fs::read_dir(&self.base_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();
        Ok(dirs)
    }
}

/// Rehydrate a skeleton from an archived task.
///
/// Archived messages carry role + body only, so the sequence is rebuilt
/// through the classifier; the archive's metadata block is adopted as-is
/// apart from the indexing state, which never travels between machines.
pub fn skeleton_from_archive(archived: &ArchivedTask) -> ConversationSkeleton {
    let mut metadata = archived.metadata.clone();
    metadata.indexing_state = None;

    let mut skeleton = ConversationSkeleton::new(archived.task_id.clone(), metadata);
    skeleton.sequence = archived
        .messages
        .iter()
        .enumerate()
        .map(|(index, message)| {
            let actor = if message.role == "assistant" {
                Actor::Assistant
            } else {
                Actor::User
            };
            let classified = taskloom_engine::classify_text(actor, &message.content);
            taskloom_types::ClassifiedItem {
                actor,
                tag: classified.tag,
                content: message.content.clone(),
                original_index: index,
                timestamp: message.timestamp,
                line_number: None,
                tool_name: classified.tool_name,
                result_kind: classified.result_kind,
            }
        })
        .collect();

    skeleton.is_completed = skeleton
        .sequence
        .iter()
        .rev()
        .find(|item| item.actor == Actor::Assistant)
        .is_some_and(|item| item.tag == taskloom_types::ContentTag::Completion);

    skeleton
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use taskloom_types::{ClassifiedItem, ContentTag, SkeletonMetadata};

    fn skeleton_with_messages(id: &str) -> ConversationSkeleton {
        let mut s = ConversationSkeleton::new(
            id,
            SkeletonMetadata::new(PathBuf::from("/t"), Utc::now()),
        );
        s.sequence = vec![
            ClassifiedItem::new(Actor::User, ContentTag::UserMessage, "fix the bug", 0),
            ClassifiedItem::new(
                Actor::Assistant,
                ContentTag::Completion,
                "<attempt_completion><result>Fixed.</result></attempt_completion>",
                1,
            ),
        ];
        s
    }

    #[test]
    fn write_then_find_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = ArchiveWriter::new(tmp.path(), "machine-a", "host-a.local");
        writer.write(&skeleton_with_messages("task-1")).unwrap();

        let reader = ArchiveReader::new(tmp.path());
        let archived = reader.find("task-1").unwrap().unwrap();
        assert_eq!(archived.version, ARCHIVE_SCHEMA_VERSION);
        assert_eq!(archived.machine_id, "machine-a");
        assert_eq!(archived.messages.len(), 2);
        assert_eq!(archived.messages[0].role, "user");

        assert!(reader.find("task-2").unwrap().is_none());
    }

    #[test]
    fn long_messages_are_truncated_with_marker() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = ArchiveWriter::new(tmp.path(), "m", "h");

        let mut skeleton = skeleton_with_messages("big");
        skeleton.sequence[0].content = "x".repeat(20 * 1024);
        writer.write(&skeleton).unwrap();

        let archived = ArchiveReader::new(tmp.path()).find("big").unwrap().unwrap();
        assert!(archived.messages[0].content.len() <= ARCHIVE_MESSAGE_MAX_BYTES + TRUNCATION_MARKER.len());
        assert!(archived.messages[0].content.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn imported_archive_rebuilds_a_classified_skeleton() {
        let tmp = tempfile::tempdir().unwrap();
        let mut original = skeleton_with_messages("task-r");
        original.sequence.push(ClassifiedItem::new(
            Actor::User,
            ContentTag::ToolResult,
            "[read_file] Result: contents",
            2,
        ));
        ArchiveWriter::new(tmp.path(), "m", "h").write(&original).unwrap();

        let archived = ArchiveReader::new(tmp.path()).find("task-r").unwrap().unwrap();
        let rebuilt = skeleton_from_archive(&archived);

        assert_eq!(rebuilt.task_id, "task-r");
        assert_eq!(rebuilt.sequence.len(), 3);
        assert_eq!(rebuilt.sequence[2].tag, ContentTag::ToolResult);
        assert_eq!(rebuilt.sequence[2].tool_name.as_deref(), Some("read_file"));
        assert!(rebuilt.is_completed);
        assert!(rebuilt.metadata.indexing_state.is_none());
    }

    #[test]
    fn reader_scans_machines_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        ArchiveWriter::new(tmp.path(), "machine-b", "b")
            .write(&skeleton_with_messages("shared"))
            .unwrap();
        ArchiveWriter::new(tmp.path(), "machine-a", "a")
            .write(&skeleton_with_messages("shared"))
            .unwrap();

        let found = ArchiveReader::new(tmp.path()).find("shared").unwrap().unwrap();
        assert_eq!(found.machine_id, "machine-a");

        let listing = ArchiveReader::new(tmp.path()).list().unwrap();
        assert_eq!(
            listing,
            vec![
                ("machine-a".to_string(), "shared".to_string()),
                ("machine-b".to_string(), "shared".to_string())
            ]
        );
    }
}
