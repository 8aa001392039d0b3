// Error types
pub mod error;

// Filesystem discovery
pub mod detect;

// Log parsers
pub mod exchange;
pub mod markdown;
pub mod metadata;
pub mod ui;

// Shared file I/O helpers
pub mod io;

pub use detect::{TaskDetector, TaskDirManifest, get_default_task_roots};
pub use error::{Error, Result};
pub use exchange::{
    MessageEvent, MessageRole, ToolUseRef, parse_exchange_file, parse_exchange_str,
};
pub use markdown::{TranscriptSection, parse_markdown_transcript};
pub use metadata::{TaskMetadataFile, parse_metadata_file, parse_metadata_str};
pub use ui::{UiEvent, UiEventKind, parse_ui_file, parse_ui_str};

/// Canonical file names inside a task directory.
pub const EXCHANGE_LOG_FILE: &str = "api_conversation_history.json";
pub const UI_LOG_FILE: &str = "ui_messages.json";
pub const TASK_METADATA_FILE: &str = "task_metadata.json";
