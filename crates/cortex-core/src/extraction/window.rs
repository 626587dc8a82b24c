//! Transcript windowing
//!
//! Transcripts are newline-delimited JSON; line boundaries are record
//! boundaries. A capped window never splits a record: it is truncated back
//! to the last complete newline, and the cursor advances by exactly the
//! bytes consumed. When the whole remainder fits it is taken as-is, since
//! the transcript is complete once the session has ended.

/// A windowing step: the text to process and the cursor after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub text: String,
    pub new_cursor: u64,
}

/// Take up to `max_bytes` from `content` starting at `cursor`.
///
/// A window shorter than the remainder is truncated to its last complete
/// newline; if it contains no newline at all, the window is empty and the
/// cursor does not advance. A remainder that fits is consumed whole,
/// advancing the cursor to end-of-content.
pub fn take_window(content: &[u8], cursor: u64, max_bytes: usize) -> Window {
    let start = (cursor as usize).min(content.len());
    let remainder = &content[start..];

    if remainder.is_empty() {
        return Window {
            text: String::new(),
            new_cursor: cursor,
        };
    }

    if remainder.len() <= max_bytes {
        return Window {
            text: String::from_utf8_lossy(remainder).into_owned(),
            new_cursor: (start + remainder.len()) as u64,
        };
    }

    let raw = &remainder[..max_bytes];
    match raw.iter().rposition(|b| *b == b'\n') {
        Some(position) => {
            let end = position + 1;
            Window {
                text: String::from_utf8_lossy(&raw[..end]).into_owned(),
                new_cursor: (start + end) as u64,
            }
        }
        None => Window {
            text: String::new(),
            new_cursor: cursor,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Scenario: 12-byte window keeps two complete lines.
    #[test]
    fn test_truncates_to_last_newline() {
        let content = b"line1\nline2\nline3\n";
        let window = take_window(content, 0, 12);
        assert_eq!(window.text, "line1\nline2\n");
        assert_eq!(window.new_cursor, 12);
    }

    // Scenario: remainder fits, cursor lands at end-of-content.
    #[test]
    fn test_remainder_fits() {
        let content = b"line1\nline2\nline3\n";
        let window = take_window(content, 6, 1000);
        assert_eq!(window.text, "line2\nline3\n");
        assert_eq!(window.new_cursor, 18);
    }

    #[test]
    fn test_mid_line_cut_drops_partial_record() {
        let content = b"line1\nline2\nline3\n";
        // 8 bytes from 0 covers line1 plus a partial line2
        let window = take_window(content, 0, 8);
        assert_eq!(window.text, "line1\n");
        assert_eq!(window.new_cursor, 6);
    }

    #[test]
    fn test_no_newline_in_window_emits_empty() {
        let content = b"a very long single record without any newline at all";
        let window = take_window(content, 0, 10);
        assert_eq!(window.text, "");
        assert_eq!(window.new_cursor, 0);
    }

    #[test]
    fn test_fitting_remainder_taken_whole_even_unterminated() {
        let content = b"line1\nfinal record";
        let window = take_window(content, 0, 1000);
        assert_eq!(window.text, "line1\nfinal record");
        assert_eq!(window.new_cursor, 18);
    }

    #[test]
    fn test_cursor_at_or_past_end() {
        let content = b"line1\n";
        let window = take_window(content, 6, 100);
        assert_eq!(window.text, "");
        assert_eq!(window.new_cursor, 6);

        let window = take_window(content, 999, 100);
        assert_eq!(window.text, "");
        assert_eq!(window.new_cursor, 999);
    }

    #[test]
    fn test_empty_content() {
        let window = take_window(b"", 0, 100);
        assert_eq!(window.text, "");
        assert_eq!(window.new_cursor, 0);
    }

    #[test]
    fn test_successive_windows_cover_content() {
        let content = b"aa\nbb\ncc\ndd\n";
        let mut cursor = 0;
        let mut collected = String::new();
        loop {
            let window = take_window(content, cursor, 5);
            if window.text.is_empty() {
                break;
            }
            collected.push_str(&window.text);
            cursor = window.new_cursor;
        }
        assert_eq!(collected.as_bytes(), content);
    }
}
