use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

pub use taskloom_types::{MIN_INSTRUCTION_GRAPHEMES, PREFIX_LENGTH};

/// Reduce instruction text to its normalised prefix.
///
/// NFC, ASCII-whitespace runs collapsed to a single space, trimmed, then
/// the leading `k` code points (not bytes). Pure; extraction and matching
/// must call this with the same `k` (see [`PREFIX_LENGTH`]).
pub fn normalize_prefix(text: &str, k: usize) -> String {
    let nfc: String = text.nfc().collect();
    let collapsed = nfc.split_ascii_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(k).collect()
}

/// Grapheme-cluster count, the unit of the minimum-length rule.
pub fn grapheme_len(text: &str) -> usize {
    text.graphemes(true).count()
}

/// Whether a normalised prefix is long enough to carry signal.
pub fn is_substantial(text: &str) -> bool {
    grapheme_len(text) >= MIN_INSTRUCTION_GRAPHEMES
}
