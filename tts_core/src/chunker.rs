/// Default minimum length of a spoken span, in characters.
pub const DEFAULT_MIN_SPAN_CHARS: usize = 12;

/// Cuts streamed text into sentence or paragraph spans for synthesis.
///
/// A span ends at a newline, at a full-width terminator (`。！？`), or at
/// `.`, `!`, `?`, `…` followed by whitespace. Trailing quotes and brackets
/// stay with their sentence. Sentences shorter than `min_chars` are merged
/// with the next one; a newline always closes the span.
#[derive(Debug)]
pub struct SentenceChunker {
    pending: String,
    min_chars: usize,
}

impl Default for SentenceChunker {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_SPAN_CHARS)
    }
}

impl SentenceChunker {
    pub fn new(min_chars: usize) -> Self {
        Self {
            pending: String::new(),
            min_chars,
        }
    }

    /// Add a delta and return every span it completed, trimmed.
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.pending.push_str(delta);

        let mut spans = Vec::new();
        while let Some(end) = self.next_boundary() {
            let span: String = self.pending.drain(..end).collect();
            let span = span.trim();
            if !span.is_empty() {
                spans.push(span.to_string());
            }
        }
        spans
    }

    /// Return whatever is left once generation has ended.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        let rest = rest.trim();
        (!rest.is_empty()).then(|| rest.to_string())
    }

    fn next_boundary(&self) -> Option<usize> {
        let mut chars = self.pending.char_indices().peekable();
        while let Some((idx, ch)) = chars.next() {
            let end = if ch == '\n' {
                return Some(idx + 1);
            } else if is_full_width_terminator(ch) {
                let mut end = idx + ch.len_utf8();
                while let Some(&(i, c)) = chars.peek() {
                    if !is_closer(c) {
                        break;
                    }
                    end = i + c.len_utf8();
                    chars.next();
                }
                Some(end)
            } else if is_terminator(ch) {
                let mut end = idx + ch.len_utf8();
                while let Some(&(i, c)) = chars.peek() {
                    if !(is_terminator(c) || is_closer(c)) {
                        break;
                    }
                    end = i + c.len_utf8();
                    chars.next();
                }
                // At the end of the buffer we cannot tell "3." from "3.14" yet.
                match chars.peek() {
                    Some(&(_, next)) if next.is_whitespace() => Some(end),
                    _ => None,
                }
            } else {
                None
            };

            if let Some(end) = end {
                if self.pending[..end].trim().chars().count() >= self.min_chars {
                    return Some(end);
                }
            }
        }
        None
    }
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '…')
}

fn is_full_width_terminator(c: char) -> bool {
    matches!(c, '。' | '！' | '？')
}

fn is_closer(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | ']' | '”' | '’' | '」' | '』')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(chunker: &mut SentenceChunker, deltas: &[&str]) -> Vec<String> {
        deltas.iter().flat_map(|d| chunker.push(d)).collect()
    }

    #[test]
    fn splits_on_sentence_end_followed_by_space() {
        let mut chunker = SentenceChunker::new(0);
        let spans = feed(&mut chunker, &["Hello the", "re. How are", " you?"]);
        assert_eq!(spans, vec!["Hello there."]);
        assert_eq!(chunker.finish(), Some("How are you?".to_string()));
        assert_eq!(chunker.finish(), None);
    }

    #[test]
    fn waits_when_terminator_ends_the_buffer() {
        let mut chunker = SentenceChunker::new(0);
        assert!(chunker.push("Pi is 3.").is_empty());
        assert!(chunker.push("14 exactly").is_empty());
        assert_eq!(chunker.push("! Yes"), vec!["Pi is 3.14 exactly!"]);
    }

    #[test]
    fn merges_short_sentences() {
        let mut chunker = SentenceChunker::new(12);
        let spans = chunker.push("Hi. I am here now. Ok ");
        assert_eq!(spans, vec!["Hi. I am here now."]);
        assert_eq!(chunker.finish(), Some("Ok".to_string()));
    }

    #[test]
    fn newline_closes_a_paragraph_even_when_short() {
        let mut chunker = SentenceChunker::new(12);
        let spans = chunker.push("Dawn\n\nThe quiet returns. ");
        assert_eq!(spans, vec!["Dawn", "The quiet returns."]);
    }

    #[test]
    fn keeps_closing_quotes_and_handles_full_width() {
        let mut chunker = SentenceChunker::new(0);
        let spans = chunker.push("She said \"wait.\" Then 새벽이 왔어요。그리고");
        assert_eq!(spans, vec!["She said \"wait.\"", "Then 새벽이 왔어요。"]);
        assert_eq!(chunker.finish(), Some("그리고".to_string()));
    }

    #[test]
    fn ellipsis_and_repeated_marks_stay_together() {
        let mut chunker = SentenceChunker::new(0);
        let spans = chunker.push("Really?! Well... ");
        assert_eq!(spans, vec!["Really?!", "Well..."]);
    }
}
