//! Bounded capture buffer for sandbox output

use tracing::debug;

/// Text shown when a run produced nothing at all
pub const NO_OUTPUT: &str = "(no output)";

/// Append-only text buffer that stops growing at a character limit
///
/// Everything past the limit is counted, not stored, and `render` reports the
/// dropped amount in a footer.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    text: String,
    chars: usize,
    max_chars: usize,
    dropped: usize,
}

impl OutputBuffer {
    pub fn new(max_chars: usize) -> Self {
        Self {
            text: String::new(),
            chars: 0,
            max_chars,
            dropped: 0,
        }
    }

    /// Append text verbatim
    pub fn push(&mut self, s: &str) {
        let room = self.max_chars.saturating_sub(self.chars);
        let incoming = s.chars().count();

        if incoming <= room {
            self.text.push_str(s);
            self.chars += incoming;
            return;
        }

        let kept: String = s.chars().take(room).collect();
        self.text.push_str(&kept);
        self.chars += room;
        self.dropped += incoming - room;
    }

    /// Append text followed by a newline
    pub fn push_line(&mut self, s: &str) {
        self.push(s);
        self.push("\n");
    }

    pub fn is_empty(&self) -> bool {
        self.chars == 0 && self.dropped == 0
    }

    /// Characters discarded so far
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Final text, with a truncation footer when anything was dropped
    pub fn render(&self) -> String {
        if self.is_empty() {
            return NO_OUTPUT.to_string();
        }

        let body = self.text.trim_end_matches('\n');
        if self.dropped == 0 {
            return body.to_string();
        }

        debug!(dropped = %self.dropped, "OutputBuffer::render: output truncated");
        format!("{}\n... [output truncated: {} more characters dropped]", body, self.dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_renders_placeholder() {
        let buffer = OutputBuffer::new(100);
        assert_eq!(buffer.render(), NO_OUTPUT);
    }

    #[test]
    fn test_lines_are_joined() {
        let mut buffer = OutputBuffer::new(100);
        buffer.push_line("a");
        buffer.push_line("b");
        assert_eq!(buffer.render(), "a\nb");
    }

    #[test]
    fn test_truncation_footer() {
        let mut buffer = OutputBuffer::new(5);
        buffer.push("hello world");
        assert_eq!(buffer.dropped(), 6);
        let rendered = buffer.render();
        assert!(rendered.starts_with("hello\n"));
        assert!(rendered.contains("6 more characters dropped"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let mut buffer = OutputBuffer::new(3);
        buffer.push("héllo");
        assert!(buffer.render().starts_with("hél"));
    }

    proptest! {
        #[test]
        fn test_stored_text_never_exceeds_limit(
            chunks in proptest::collection::vec(".{0,64}", 0..32),
            max_chars in 0usize..256,
        ) {
            let mut buffer = OutputBuffer::new(max_chars);
            let mut total = 0usize;
            for chunk in &chunks {
                buffer.push_line(chunk);
                total += chunk.chars().count() + 1;
            }

            prop_assert!(buffer.text.chars().count() <= max_chars);
            prop_assert_eq!(buffer.text.chars().count() + buffer.dropped(), total);
            prop_assert!(!buffer.render().is_empty());
        }
    }
}
