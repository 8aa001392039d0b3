use serde_json::Value;

/// Default sub-chunk ceiling, in characters.
pub const MAX_CHUNK_SIZE: usize = 800;

/// A granular content chunk handed to the pipeline by the extractor
/// (an external collaborator).
#[derive(Debug, Clone)]
pub struct TaskChunk {
    pub chunk_id: String,
    pub text: String,
    /// Flat payload fields carried onto every upserted point.
    pub payload: Value,
}

/// A chunk piece small enough to embed.
#[derive(Debug, Clone, PartialEq)]
pub struct SubChunk {
    /// `<chunk_id>` for whole chunks, `<chunk_id>-<n>` for splits.
    pub id: String,
    pub text: String,
}

/// Split a chunk into sub-chunks of at most `max_chars` characters,
/// cutting on char boundaries. Word boundaries are preferred when one
/// exists inside the tail of the window.
pub fn split_chunk(chunk_id: &str, text: &str, max_chars: usize) -> Vec<SubChunk> {
    let total: usize = text.chars().count();
    if total <= max_chars {
        return vec![SubChunk {
            id: chunk_id.to_string(),
            text: text.to_string(),
        }];
    }

    let chars: Vec<char> = text.chars().collect();
    let mut pieces = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let hard_end = (start + max_chars).min(chars.len());
        let mut end = hard_end;

        if hard_end < chars.len() {
            // Back off to the last whitespace in the final 20% of the
            // window, if any, to avoid mid-word cuts.
            let floor = start + max_chars * 4 / 5;
            if let Some(ws) = (floor..hard_end).rev().find(|&i| chars[i].is_whitespace()) {
                end = ws;
            }
        }

        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim().to_string();
        if !piece.is_empty() {
            pieces.push(piece);
        }
        start = if end > start { end } else { start + max_chars };
    }

    pieces
        .into_iter()
        .enumerate()
        .map(|(n, text)| SubChunk {
            id: format!("{}-{}", chunk_id, n),
            text,
        })
        .collect()
}
