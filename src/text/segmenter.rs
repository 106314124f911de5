//! Text segmentation
//!
//! Splits normalized text into sentence-sized segments that can be
//! synthesized independently and streamed as soon as each is ready:
//! - Sentence boundaries (terminator runs followed by whitespace or the end)
//! - Decimal numbers and single-letter initials are never split
//! - Over-long sentences fall back to clause, conjunction, whitespace and
//!   finally hard character splits

use serde::{Deserialize, Serialize};
use std::ops::Range;
use uuid::Uuid;

use super::language::Language;
use super::normalizer::NormalizedText;

/// Sentence-ending punctuation characters
const SENTENCE_ENDINGS: &[char] = &['.', '!', '?', '…', '。', '！', '？'];

/// Clause-separating punctuation (for fallback splitting)
const CLAUSE_SEPARATORS: &[char] = &[',', ';', ':', '，', '；', '：'];

/// Closing marks that stay attached to the sentence they end
const CLOSING_MARKS: &[char] = &['"', '\'', ')', ']', '}', '»', '”', '’'];

/// Segmenter configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Longest segment, in characters, before clause splitting kicks in
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    /// Shortest clause piece produced by a clause split
    #[serde(default = "default_min_clause_chars")]
    pub min_clause_chars: usize,
}

fn default_max_chars() -> usize {
    200
}

fn default_min_clause_chars() -> usize {
    20
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            min_clause_chars: default_min_clause_chars(),
        }
    }
}

/// A contiguous piece of normalized text, synthesized as one engine call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub request_id: Uuid,
    /// Zero-based position in source order
    pub index: usize,
    /// Byte range into the normalized text
    pub span: Range<usize>,
    pub text: String,
}

impl Segment {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Sentence segmenter
#[derive(Debug, Clone, Default)]
pub struct Segmenter {
    config: SegmenterConfig,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config: SegmenterConfig {
                max_chars: config.max_chars.max(1),
                min_clause_chars: config.min_clause_chars,
            },
        }
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Split normalized text into ordered segments
    ///
    /// Always returns at least one segment; text with no speakable content
    /// yields a single empty segment.
    pub fn segment(&self, text: &NormalizedText, request_id: Uuid) -> Vec<Segment> {
        let source = text.as_str();
        let mut spans = Vec::new();
        for sentence in merge_unspeakable(source, sentence_spans(source)) {
            self.split_long(source, sentence, text.language(), &mut spans);
        }

        if spans.is_empty() {
            return vec![Segment {
                request_id,
                index: 0,
                span: 0..0,
                text: String::new(),
            }];
        }

        spans
            .into_iter()
            .enumerate()
            .map(|(index, span)| Segment {
                request_id,
                index,
                text: source[span.clone()].to_string(),
                span,
            })
            .collect()
    }

    /// Break a sentence span down until every piece fits `max_chars`
    fn split_long(&self, source: &str, span: Range<usize>, language: Language, out: &mut Vec<Range<usize>>) {
        let mut remaining = span;

        loop {
            let piece = &source[remaining.clone()];
            if piece.chars().count() <= self.config.max_chars {
                out.push(remaining);
                return;
            }

            // Byte offset of the character just past the window
            let window_end = piece
                .char_indices()
                .nth(self.config.max_chars)
                .map(|(i, _)| i)
                .unwrap_or(piece.len());
            let window = &piece[..window_end];
            let min = min_offset(window, self.config.min_clause_chars);

            let split_at = find_last_clause_boundary(window, min)
                .or_else(|| find_last_conjunction(window, language, min))
                .or_else(|| find_last_whitespace(window))
                .unwrap_or(window_end);

            let head = trim_range(source, remaining.start..remaining.start + split_at);
            if !head.is_empty() {
                out.push(head);
            }
            remaining = trim_range(source, remaining.start + split_at..remaining.end);
            if remaining.is_empty() {
                return;
            }
        }
    }
}

/// Segment with the default configuration
pub fn segment(text: &NormalizedText, request_id: Uuid) -> Vec<Segment> {
    Segmenter::default().segment(text, request_id)
}

/// Sentence spans, trimmed of surrounding whitespace
fn sentence_spans(text: &str) -> Vec<Range<usize>> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut spans = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let (_, c) = chars[i];
        if !SENTENCE_ENDINGS.contains(&c) {
            i += 1;
            continue;
        }

        // Decimal point between digits
        if c == '.'
            && i > 0
            && chars[i - 1].1.is_ascii_digit()
            && chars.get(i + 1).is_some_and(|(_, n)| n.is_ascii_digit())
        {
            i += 1;
            continue;
        }

        let run_start = i;
        let mut j = i;
        while j < chars.len() && SENTENCE_ENDINGS.contains(&chars[j].1) {
            j += 1;
        }
        let single_period = c == '.' && j - run_start == 1;
        while j < chars.len() && CLOSING_MARKS.contains(&chars[j].1) {
            j += 1;
        }

        let at_end = j == chars.len();
        let followed_by_space = chars.get(j).is_some_and(|(_, n)| n.is_whitespace());

        if (at_end || followed_by_space) && !(single_period && follows_initial(&chars, run_start)) {
            let end = chars.get(j).map_or(text.len(), |(offset, _)| *offset);
            let span = trim_range(text, start..end);
            if !span.is_empty() {
                spans.push(span);
            }
            start = end;
        }
        i = j;
    }

    let tail = trim_range(text, start..text.len());
    if !tail.is_empty() {
        spans.push(tail);
    }
    spans
}

/// True when the character before `pos` is a lone letter, as in "J. Doe"
fn follows_initial(chars: &[(usize, char)], pos: usize) -> bool {
    if pos == 0 || !chars[pos - 1].1.is_alphabetic() {
        return false;
    }
    pos == 1 || !chars[pos - 2].1.is_alphanumeric()
}

/// Fold spans with nothing to pronounce into a neighbour
fn merge_unspeakable(text: &str, spans: Vec<Range<usize>>) -> Vec<Range<usize>> {
    let mut merged: Vec<Range<usize>> = Vec::with_capacity(spans.len());
    let mut pending_start: Option<usize> = None;

    for span in spans {
        let speakable = text[span.clone()].chars().any(char::is_alphanumeric);
        if speakable {
            let start = pending_start.take().unwrap_or(span.start);
            merged.push(start..span.end);
        } else if let Some(last) = merged.last_mut() {
            last.end = span.end;
        } else {
            pending_start.get_or_insert(span.start);
        }
    }

    merged
}

fn trim_range(text: &str, range: Range<usize>) -> Range<usize> {
    let slice = &text[range.clone()];
    let start = range.start + (slice.len() - slice.trim_start().len());
    let end = range.end - (slice.len() - slice.trim_end().len());
    if start >= end {
        start..start
    } else {
        start..end
    }
}

/// Byte offset of the `min_chars`-th character, clamped to the window
fn min_offset(window: &str, min_chars: usize) -> usize {
    window
        .char_indices()
        .nth(min_chars)
        .map(|(i, _)| i)
        .unwrap_or(window.len())
}

/// Split offset just past the last clause separator
fn find_last_clause_boundary(window: &str, min: usize) -> Option<usize> {
    window
        .char_indices()
        .rev()
        .find(|(i, c)| *i >= min && CLAUSE_SEPARATORS.contains(c))
        .map(|(i, c)| i + c.len_utf8())
}

fn conjunctions(language: Language) -> &'static [&'static str] {
    match language {
        Language::En => &["and", "but", "or", "so", "because"],
        Language::Fr => &["et", "mais", "ou", "donc", "car"],
        Language::Es => &["y", "pero", "o", "porque"],
        Language::Pt => &["e", "mas", "ou", "porque"],
        Language::Ko => &[],
    }
}

/// Split offset just before the last conjunction word
fn find_last_conjunction(window: &str, language: Language, min: usize) -> Option<usize> {
    let words = conjunctions(language);
    window
        .char_indices()
        .filter(|(i, c)| *i >= min && c.is_whitespace())
        .map(|(i, c)| i + c.len_utf8())
        .filter(|&word_start| {
            let rest = &window[word_start..];
            let word_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            // The conjunction must be followed by more text inside the window
            word_end < rest.len() && words.contains(&&rest[..word_end])
        })
        .last()
}

fn find_last_whitespace(window: &str) -> Option<usize> {
    window
        .char_indices()
        .rev()
        .find(|(i, c)| *i > 0 && c.is_whitespace())
        .map(|(i, _)| i)
}
