/// Largest UTF-8 boundary at or before `max_bytes`.
#[inline]
fn safe_byte_boundary(s: &str, max_bytes: usize) -> usize {
    if max_bytes >= s.len() {
        return s.len();
    }
    let mut boundary = max_bytes;
    while !s.is_char_boundary(boundary) {
        boundary -= 1;
    }
    boundary
}

/// Truncate captured output to `max_bytes`, keeping the tail.
///
/// The dropped head is replaced with a marker naming how many bytes were cut.
pub fn truncate_output(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut start = s.len() - max_bytes;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    format!("[truncated {} bytes]...{}", start, &s[start..])
}

/// Truncate a string with a marker if it exceeds `max_len` bytes (UTF-8 safe).
#[inline]
pub fn truncate_with_marker(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let boundary = safe_byte_boundary(s, max_len);
        format!("{}...[truncated]", &s[..boundary])
    }
}

/// Quote a string for POSIX `sh` as a single word.
///
/// Wraps in single quotes; embedded single quotes become `'\''`.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"@%+=:,./-_".contains(&b))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_with_marker_short() {
        assert_eq!(truncate_with_marker("hello", 10), "hello");
        assert_eq!(truncate_with_marker("hello", 5), "hello");
    }

    #[test]
    fn test_truncate_with_marker_long() {
        assert_eq!(truncate_with_marker("hello world", 5), "hello...[truncated]");
    }

    #[test]
    fn test_truncate_with_marker_unicode() {
        let korean = "안녕하세요 세계입니다";
        let result = truncate_with_marker(korean, 10);
        assert!(result.starts_with("안녕하"));
        assert!(result.ends_with("...[truncated]"));
    }

    #[test]
    fn test_truncate_output_keeps_tail() {
        let out = truncate_output("line1\nline2\nFAILED: assertion", 17);
        assert!(out.ends_with("FAILED: assertion"));
        assert!(out.starts_with("[truncated 12 bytes]"));
        assert_eq!(truncate_output("short", 64), "short");
    }

    #[test]
    fn test_truncate_output_unicode() {
        let out = truncate_output("세계입니다", 4);
        assert!(out.ends_with("다"));
    }

    #[test]
    fn test_shell_quote_plain_word() {
        assert_eq!(shell_quote("cargo"), "cargo");
        assert_eq!(shell_quote("src/lib.rs"), "src/lib.rs");
    }

    #[test]
    fn test_shell_quote_metacharacters() {
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("$(rm -rf /)"), "'$(rm -rf /)'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_shell_quote_round_trips_through_sh() {
        let nasty = "it's `whoami` $HOME; echo \"x\" | cat";
        let output = std::process::Command::new("sh")
            .arg("-c")
            .arg(format!("printf %s {}", shell_quote(nasty)))
            .output()
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout), nasty);
    }
}
