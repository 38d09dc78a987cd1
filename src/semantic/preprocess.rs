//! Content preprocessing for embedding generation.
//!
//! Prepares raw note files for embedding:
//! 1. Drop the front-matter block delimited by `---` lines
//! 2. Trim whitespace
//! 3. Skip if empty
//!
//! Previews stored next to the index are truncated to `MAX_PREVIEW_CHARS`.

/// Line that opens and closes a front-matter block
pub const FRONT_MATTER_DELIMITER: &str = "---";

/// Maximum preview length stored in metadata (characters, not bytes)
pub const MAX_PREVIEW_CHARS: usize = 500;

/// Strip the front-matter block from a raw note.
///
/// Everything up to and including the second delimiter line is discarded.
/// Without two delimiter lines the whole document is content.
pub fn strip_front_matter(raw: &str) -> String {
    let mut delimiters = raw
        .split_inclusive('\n')
        .scan(0usize, |offset, line| {
            let start = *offset;
            *offset += line.len();
            Some((start + line.len(), line))
        })
        .filter(|(_, line)| line.trim_end_matches(['\n', '\r']) == FRONT_MATTER_DELIMITER)
        .map(|(end, _)| end);

    match (delimiters.next(), delimiters.next()) {
        (Some(_), Some(body_start)) => raw[body_start..].trim().to_string(),
        _ => raw.trim().to_string(),
    }
}

/// Preprocess a raw note for embedding.
///
/// Returns `None` if nothing is left after stripping front matter.
pub fn preprocess_note(raw: &str) -> Option<String> {
    let content = strip_front_matter(raw);
    if content.is_empty() {
        None
    } else {
        Some(content)
    }
}

/// Preprocess forum post text, which carries no front matter.
pub fn preprocess_post(content: &str) -> Option<String> {
    let content = content.trim();
    if content.is_empty() {
        None
    } else {
        Some(content.to_string())
    }
}

/// Truncate content to `MAX_PREVIEW_CHARS` without splitting UTF-8 sequences.
pub fn truncate_preview(content: &str) -> String {
    match content.char_indices().nth(MAX_PREVIEW_CHARS) {
        Some((byte_idx, _)) => content[..byte_idx].to_string(),
        None => content.to_string(),
    }
}

/// Take `count` lines starting at 1-based line `start`, joined as in the file.
pub fn line_window(raw: &str, start: usize, count: usize) -> String {
    raw.split_inclusive('\n')
        .skip(start.saturating_sub(1))
        .take(count)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_front_matter() {
        let raw = "---\ntitle: Week 1\ndate: 2025-01-01\n---\n\nLecture 1 covers arrays.\n";
        assert_eq!(strip_front_matter(raw), "Lecture 1 covers arrays.");
    }

    #[test]
    fn test_no_front_matter_keeps_everything() {
        let raw = "  Plain note body.\nSecond line.\n\n";
        assert_eq!(strip_front_matter(raw), "Plain note body.\nSecond line.");
    }

    #[test]
    fn test_single_delimiter_keeps_everything() {
        let raw = "---\nnever closed\n";
        assert_eq!(strip_front_matter(raw), "---\nnever closed");
    }

    #[test]
    fn test_delimiter_must_be_whole_line() {
        let raw = "--- not a delimiter\nbody\n----\nmore\n";
        assert_eq!(strip_front_matter(raw), raw.trim());
    }

    #[test]
    fn test_first_delimiter_need_not_be_first_line() {
        let raw = "preamble\n---\nkey: value\n---\nbody";
        assert_eq!(strip_front_matter(raw), "body");
    }

    #[test]
    fn test_crlf_delimiters() {
        let raw = "---\r\ntitle: x\r\n---\r\nbody text\r\n";
        assert_eq!(strip_front_matter(raw), "body text");
    }

    #[test]
    fn test_delimiter_on_last_line_without_newline() {
        let raw = "---\ntitle: only front matter\n---";
        assert_eq!(strip_front_matter(raw), "");
        assert!(preprocess_note(raw).is_none());
    }

    #[test]
    fn test_empty_after_strip_returns_none() {
        assert!(preprocess_note("---\ntitle: x\n---\n   \n\t\n").is_none());
        assert!(preprocess_note("").is_none());
        assert!(preprocess_post("  \n ").is_none());
    }

    #[test]
    fn test_post_is_trimmed() {
        assert_eq!(
            preprocess_post("  The deadline is March 5.  "),
            Some("The deadline is March 5.".to_string())
        );
    }

    #[test]
    fn test_truncate_preview() {
        let long = "x".repeat(600);
        assert_eq!(truncate_preview(&long).chars().count(), MAX_PREVIEW_CHARS);

        let short = "short";
        assert_eq!(truncate_preview(short), short);
    }

    #[test]
    fn test_truncate_preview_multibyte() {
        let long = "é".repeat(501);
        let preview = truncate_preview(&long);
        assert_eq!(preview.chars().count(), 500);
        assert_eq!(preview.len(), 1000);
    }

    #[test]
    fn test_line_window() {
        let raw = (1..=15).map(|i| format!("line {i}\n")).collect::<String>();
        let window = line_window(&raw, 5, 8);
        assert!(window.starts_with("line 5\n"));
        assert!(window.ends_with("line 12\n"));
        assert_eq!(window.lines().count(), 8);
    }

    #[test]
    fn test_line_window_past_end() {
        assert_eq!(line_window("a\nb\n", 5, 8), "");
        assert_eq!(line_window("1\n2\n3\n4\n5", 5, 8), "5");
    }
}
