/// Check if a string is task-id shaped: a hyphenated UUID.
pub fn is_task_id_shape(s: &str) -> bool {
    if s.len() != 36 {
        return false;
    }
    s.char_indices().all(|(i, c)| match i {
        8 | 13 | 18 | 23 => c == '-',
        _ => c.is_ascii_hexdigit(),
    })
}

/// Truncate a string to a maximum number of characters.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect::<String>() + "..."
    }
}

/// Truncate to a byte budget on a char boundary, appending `marker` when cut.
pub fn truncate_bytes(s: &str, max_bytes: usize, marker: &str) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &s[..end], marker)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_shape() {
        assert!(is_task_id_shape("3fa85f64-5717-4562-b3fc-2c963f66afa6"));
        assert!(!is_task_id_shape("3fa85f64-5717-4562-b3fc"));
        assert!(!is_task_id_shape("3fa85f6457174562b3fc2c963f66afa6ffff"));
        assert!(!is_task_id_shape("zfa85f64-5717-4562-b3fc-2c963f66afa6"));
    }

    #[test]
    fn truncate_char_count() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 5), "hello...");
    }

    #[test]
    fn truncate_bytes_respects_char_boundary() {
        // 'é' is two bytes; cutting at byte 1 must back off to 0
        let out = truncate_bytes("ému", 1, "...[truncated]");
        assert_eq!(out, "...[truncated]");

        let out = truncate_bytes("abcdef", 3, "+");
        assert_eq!(out, "abc+");
    }
}
