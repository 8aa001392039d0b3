use std::path::Path;

use crate::Result;

/// Strip a leading UTF-8 byte-order mark, if present.
///
/// Task logs written on Windows frequently start with one; serde_json
/// rejects it.
pub fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

/// Read a file to string with the BOM removed.
pub fn read_text(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path)?;
    Ok(strip_bom(&text).to_string())
}

/// md5 checksum of a file's raw bytes, hex-encoded.
///
/// Used to detect source-file drift between skeleton builds; not a
/// security boundary.
pub fn file_checksum(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(format!("{:x}", md5::compute(&bytes)))
}

/// File size in bytes, zero when the file is missing.
pub fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_bom_once() {
        assert_eq!(strip_bom("\u{feff}[]"), "[]");
        assert_eq!(strip_bom("[]"), "[]");
        assert_eq!(strip_bom("\u{feff}\u{feff}x"), "\u{feff}x");
    }

    #[test]
    fn checksum_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.json");
        std::fs::write(&path, b"{}").unwrap();

        let a = file_checksum(&path).unwrap();
        let b = file_checksum(&path).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);

        std::fs::write(&path, b"{\"k\":1}").unwrap();
        assert_ne!(file_checksum(&path).unwrap(), a);
    }
}
