pub mod chunking;
pub mod preprocess;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use unicode_segmentation::UnicodeSegmentation;

/// Sentence boundary detection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segmentation {
    /// UAX #29 sentence boundaries
    #[default]
    Unicode,
    /// Stop character rules (handles full-width punctuation and bracket nesting)
    StopChars,
}

/// Splits text into contiguous sentence spans.
///
/// Spans are byte ranges into the input and always cover it completely:
/// whitespace following a sentence belongs to that sentence.
#[derive(Debug, Clone)]
pub struct SentenceSplitter {
    segmentation: Segmentation,
    max_buf_length: Option<usize>,
    stop_chars: HashSet<char>,
    force: HashSet<char>,
    parentheses: HashMap<char, char>,
}

impl Default for SentenceSplitter {
    fn default() -> Self {
        Self::new(Segmentation::Unicode, None, None, None, None)
    }
}

impl SentenceSplitter {
    // quoted speech inside these is kept in one sentence
    pub const PARENTHESES: [(char, char); 3] = [('「', '」'), ('『', '』'), ('【', '】')];

    // '.' only ends a sentence when followed by whitespace (urls, decimals)
    pub const STOP_CHARS: [char; 8] = ['。', '．', '！', '？', '!', '?', '.', '\n'];

    // closing marks that stay with the sentence they close
    const CLOSERS: [char; 8] = ['"', '\'', '”', '’', ')', '」', '』', '】'];

    pub fn new(
        segmentation: Segmentation,
        max_buf_length: Option<usize>,
        stop_chars: Option<HashSet<char>>,
        force: Option<HashSet<char>>,
        parentheses: Option<HashMap<char, char>>,
    ) -> Self {
        let mut stop_chars = stop_chars.unwrap_or(Self::STOP_CHARS.iter().cloned().collect());
        let force = force
            .map(|f| {
                stop_chars.extend(f.iter().cloned());
                f
            })
            .unwrap_or_default();
        let parentheses = parentheses.unwrap_or(Self::PARENTHESES.iter().cloned().collect());
        SentenceSplitter {
            segmentation,
            max_buf_length,
            stop_chars,
            force,
            parentheses,
        }
    }

    pub fn segmentation(&self) -> Segmentation {
        self.segmentation
    }

    /// Sentence byte spans, contiguous from 0 to `text.len()`.
    pub fn spans(&self, text: &str) -> Vec<Range<usize>> {
        if text.is_empty() {
            return vec![];
        }
        match self.segmentation {
            Segmentation::Unicode => text
                .split_sentence_bound_indices()
                .map(|(i, s)| i..i + s.len())
                .collect(),
            Segmentation::StopChars => self.stop_char_spans(text),
        }
    }

    pub fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        self.spans(text).into_iter().map(|r| &text[r]).collect()
    }

    fn is_stop(&self, c: char, next: Option<char>) -> bool {
        if c == '.' {
            self.stop_chars.contains(&c)
                && next.is_none_or(|n| n.is_whitespace() || Self::CLOSERS.contains(&n))
        } else {
            self.stop_chars.contains(&c)
        }
    }

    fn stop_char_spans(&self, text: &str) -> Vec<Range<usize>> {
        let mut spans = vec![];
        let mut start = 0;
        let mut buf_length = 0;
        let mut waiting_stack: Vec<char> = vec![];
        let mut chars = text.char_indices().peekable();

        while let Some((i, c)) = chars.next() {
            buf_length += 1;
            let mut end = i + c.len_utf8();
            let mut boundary = false;

            if let Some(t) = self.parentheses.get(&c) {
                waiting_stack.push(*t);
            } else if let Some(d) = waiting_stack.last() {
                if c == *d {
                    waiting_stack.pop();
                } else if self.force.contains(&c) {
                    boundary = true;
                    waiting_stack.clear();
                }
            } else if self.is_stop(c, chars.peek().map(|(_, n)| *n)) {
                boundary = true;
                while let Some(&(j, n)) = chars.peek() {
                    if !Self::CLOSERS.contains(&n) {
                        break;
                    }
                    end = j + n.len_utf8();
                    chars.next();
                }
            }

            if !boundary && self.max_buf_length.is_some_and(|m| buf_length >= m) {
                boundary = true;
                waiting_stack.clear();
            }

            if boundary {
                while let Some(&(j, n)) = chars.peek() {
                    if !n.is_whitespace() {
                        break;
                    }
                    end = j + n.len_utf8();
                    chars.next();
                }
                spans.push(start..end);
                start = end;
                buf_length = 0;
            }
        }
        if start < text.len() {
            spans.push(start..text.len());
        }
        spans
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_covers(text: &str, spans: &[Range<usize>]) {
        let mut pos = 0;
        for s in spans {
            assert_eq!(s.start, pos, "spans must be contiguous: {:?}", spans);
            assert!(s.end > s.start);
            pos = s.end;
        }
        assert_eq!(pos, text.len());
    }

    #[test]
    fn test_split_unicode() {
        let splitter = SentenceSplitter::default();
        let text = "Sentence one. Sentence two. Sentence three.";
        let sentences = splitter.split(text);
        assert_eq!(
            sentences,
            vec!["Sentence one. ", "Sentence two. ", "Sentence three."]
        );
        assert_covers(text, &splitter.spans(text));
    }

    #[test]
    fn test_split_empty() {
        let splitter = SentenceSplitter::default();
        assert!(splitter.spans("").is_empty());
        let splitter = SentenceSplitter::new(Segmentation::StopChars, None, None, None, None);
        assert!(splitter.spans("").is_empty());
    }

    #[test]
    fn test_split_stop_chars() {
        let splitter = SentenceSplitter::new(Segmentation::StopChars, None, None, None, None);
        let text = "これはテストです。次の文です！";
        assert_eq!(splitter.split(text), vec!["これはテストです。", "次の文です！"]);

        let text = "It costs 3.5 dollars. See example.com now? Yes.";
        let sentences = splitter.split(text);
        assert_eq!(
            sentences,
            vec!["It costs 3.5 dollars. ", "See example.com now? ", "Yes."]
        );
        assert_covers(text, &splitter.spans(text));
    }

    #[test]
    fn test_split_keeps_closing_quote() {
        let splitter = SentenceSplitter::new(Segmentation::StopChars, None, None, None, None);
        let text = "She said \"too pricey.\" Then left.";
        assert_eq!(
            splitter.split(text),
            vec!["She said \"too pricey.\" ", "Then left."]
        );
    }

    #[test]
    fn test_split_with_force() {
        let mut force = HashSet::new();
        force.insert('テ');
        let splitter =
            SentenceSplitter::new(Segmentation::StopChars, None, None, Some(force), None);
        assert_eq!(splitter.split("これはテストです。"), vec!["これはテ", "ストです。"]);
    }

    #[test]
    fn test_split_with_parentheses() {
        let mut parentheses = HashMap::new();
        parentheses.insert('(', ')');
        let splitter =
            SentenceSplitter::new(Segmentation::StopChars, None, None, None, Some(parentheses));
        let text = "これはテスト(です。ああ)です。";
        assert_eq!(splitter.split(text), vec!["これはテスト(です。ああ)です。"]);
    }

    #[test]
    fn test_split_with_max_buf_length() {
        let splitter = SentenceSplitter::new(Segmentation::StopChars, Some(2), None, None, None);
        let text = "これはテストです。";
        assert_eq!(splitter.split(text), vec!["これ", "はテ", "スト", "です", "。"]);
        assert_covers(text, &splitter.spans(text));
    }

    #[test]
    fn test_split_newlines_absorbed() {
        let splitter = SentenceSplitter::new(Segmentation::StopChars, None, None, None, None);
        let text = "First line\n\nSecond line";
        let spans = splitter.spans(text);
        assert_eq!(splitter.split(text), vec!["First line\n\n", "Second line"]);
        assert_covers(text, &spans);
    }
}
