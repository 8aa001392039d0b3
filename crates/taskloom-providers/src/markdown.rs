use crate::exchange::MessageRole;

/// One speaker section of a pre-rendered Markdown transcript.
#[derive(Debug, Clone)]
pub struct TranscriptSection {
    pub role: MessageRole,
    pub text: String,
    /// 1-based line of the `**User:**` / `**Assistant:**` marker.
    pub line_number: usize,
    pub index: usize,
}

const USER_MARKER: &str = "**User:**";
const ASSISTANT_MARKER: &str = "**Assistant:**";

/// Parse an exported Markdown transcript into speaker sections.
///
/// A section starts at a `**User:**` or `**Assistant:**` marker and runs
/// until the next marker or end of file. Text before the first marker is
/// ignored (export headers, horizontal rules).
pub fn parse_markdown_transcript(text: &str) -> Vec<TranscriptSection> {
    let mut sections: Vec<TranscriptSection> = Vec::new();
    let mut current: Option<TranscriptSection> = None;

    for (line_idx, line) in text.lines().enumerate() {
        let trimmed = line.trim_start();
        let marker = if trimmed.starts_with(USER_MARKER) {
            Some((MessageRole::User, USER_MARKER))
        } else if trimmed.starts_with(ASSISTANT_MARKER) {
            Some((MessageRole::Assistant, ASSISTANT_MARKER))
        } else {
            None
        };

        match marker {
            Some((role, tag)) => {
                if let Some(section) = current.take() {
                    sections.push(finish(section));
                }
                let rest = trimmed[tag.len()..].trim_start();
                current = Some(TranscriptSection {
                    role,
                    text: rest.to_string(),
                    line_number: line_idx + 1,
                    index: sections.len(),
                });
            }
            None => {
                if let Some(section) = current.as_mut() {
                    if !section.text.is_empty() {
                        section.text.push('\n');
                    }
                    section.text.push_str(line);
                }
            }
        }
    }

    if let Some(section) = current.take() {
        sections.push(finish(section));
    }
    sections
}

fn finish(mut section: TranscriptSection) -> TranscriptSection {
    section.text = section.text.trim().to_string();
    section
}
