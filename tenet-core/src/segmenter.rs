//! Text segmenter
//!
//! Splits extracted page text into bounded, paragraph-aligned segments that
//! carry page and character-offset provenance. Segments are the unit of
//! citation for every generated report item.
//!
//! Per page, paragraphs (separated by blank lines) are accumulated greedily.
//! The buffer is flushed when the next paragraph would push it past
//! `max_chars` and it already holds at least `min_chars`. A buffer that is
//! still short is instead topped up with the head of the next paragraph, cut
//! at a word boundary, so that only the last segment of a page may fall
//! below `min_chars`. Paragraphs longer than `max_chars` are pre-split the
//! same way.

use regex::Regex;
use thiserror::Error;

use crate::domain::extraction::ExtractedPage;
use crate::domain::segment::Segment;

const PARAGRAPH_SEPARATOR: &str = "\n\n";
const SEPARATOR_CHARS: usize = 2;

#[derive(Debug, Error)]
pub enum SegmenterError {
    #[error("invalid segmenter bounds: min {min} must be > 0 and < max {max}")]
    InvalidBounds { min: usize, max: usize },

    #[error("invalid paragraph pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Segment size bounds, in characters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmenterConfig {
    pub max_chars: usize,
    pub min_chars: usize,
}

impl SegmenterConfig {
    pub fn new(max_chars: usize, min_chars: usize) -> Self {
        Self {
            max_chars,
            min_chars,
        }
    }

    pub fn validate(&self) -> Result<(), SegmenterError> {
        if self.min_chars == 0 || self.min_chars >= self.max_chars {
            return Err(SegmenterError::InvalidBounds {
                min: self.min_chars,
                max: self.max_chars,
            });
        }
        Ok(())
    }
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self::new(1000, 200)
    }
}

pub struct Segmenter {
    config: SegmenterConfig,
    paragraph_break: Regex,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Result<Self, SegmenterError> {
        config.validate()?;
        Ok(Self {
            config,
            paragraph_break: Regex::new(r"\n\s*\n")?,
        })
    }

    pub fn config(&self) -> SegmenterConfig {
        self.config
    }

    /// Segments every page in order; indices are global and contiguous
    pub fn segment(&self, pages: &[ExtractedPage]) -> Vec<Segment> {
        let mut segments = Vec::new();

        for page in pages {
            if page.text.trim().is_empty() {
                continue;
            }

            let confidence = round_confidence(page.confidence);
            for span in self.segment_page(&page.text) {
                segments.push(Segment {
                    index: segments.len() as u32,
                    text: span.text,
                    page_number: page.page_number,
                    start_offset: span.start as u32,
                    end_offset: span.end as u32,
                    confidence,
                });
            }
        }

        segments
    }

    fn segment_page(&self, text: &str) -> Vec<Span> {
        let SegmenterConfig {
            max_chars,
            min_chars,
        } = self.config;

        let mut out = Vec::new();
        let mut buffer: Option<Span> = None;

        for piece in self.pieces(text) {
            let Some(mut buf) = buffer.take() else {
                buffer = flush_if_full(piece, max_chars, &mut out);
                continue;
            };

            let combined = buf.len + SEPARATOR_CHARS + piece.len;
            if combined <= max_chars {
                buf.append(piece);
                buffer = flush_if_full(buf, max_chars, &mut out);
            } else if buf.len >= min_chars {
                out.push(buf);
                buffer = flush_if_full(piece, max_chars, &mut out);
            } else {
                // Too short to stand alone: borrow the head of the next piece.
                let offset = buf.len + SEPARATOR_CHARS;
                if max_chars <= offset {
                    out.push(buf);
                    buffer = flush_if_full(piece, max_chars, &mut out);
                    continue;
                }
                let lo = min_chars.saturating_sub(offset).max(1);
                let hi = max_chars - offset;
                let (head, tail) = piece.split(lo, hi);
                buf.append(head);
                out.push(buf);
                buffer = tail;
            }
        }

        if let Some(buf) = buffer {
            out.push(buf);
        }

        out
    }

    /// Trimmed paragraphs of the page, with over-long ones pre-split
    fn pieces(&self, text: &str) -> Vec<Span> {
        let mut pieces = Vec::new();
        let mut cursor = CharCursor::default();
        let mut para_start = 0;

        let breaks = self
            .paragraph_break
            .find_iter(text)
            .map(|m| (m.start(), m.end()))
            .chain(std::iter::once((text.len(), text.len())));

        for (break_start, break_end) in breaks {
            let raw = &text[para_start..break_start];
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                let lead = raw.len() - raw.trim_start().len();
                let start = cursor.advance_to(text, para_start + lead);
                let mut rest = Some(Span::new(trimmed, start));

                while let Some(span) = rest.take() {
                    if span.len <= self.config.max_chars {
                        pieces.push(span);
                        break;
                    }
                    let (head, tail) = span.split(self.config.min_chars, self.config.max_chars);
                    pieces.push(head);
                    rest = tail;
                }
            }
            para_start = break_end;
        }

        pieces
    }
}

fn flush_if_full(span: Span, max_chars: usize, out: &mut Vec<Span>) -> Option<Span> {
    if span.len >= max_chars {
        out.push(span);
        None
    } else {
        Some(span)
    }
}

fn round_confidence(confidence: f64) -> f64 {
    (confidence.clamp(0.0, 1.0) * 100.0).round() / 100.0
}

/// Converts byte offsets into char offsets, moving forward only
#[derive(Default)]
struct CharCursor {
    byte: usize,
    chars: usize,
}

impl CharCursor {
    fn advance_to(&mut self, text: &str, byte: usize) -> usize {
        self.chars += text[self.byte..byte].chars().count();
        self.byte = byte;
        self.chars
    }
}

/// Text with its `[start, end)` char span in the page
#[derive(Debug, Clone)]
struct Span {
    text: String,
    start: usize,
    end: usize,
    /// Length of `text` in chars
    len: usize,
}

impl Span {
    fn new(text: &str, start: usize) -> Self {
        let len = text.chars().count();
        Self {
            text: text.to_string(),
            start,
            end: start + len,
            len,
        }
    }

    fn append(&mut self, other: Span) {
        self.text.push_str(PARAGRAPH_SEPARATOR);
        self.text.push_str(&other.text);
        self.len += SEPARATOR_CHARS + other.len;
        self.end = other.end;
    }

    /// Cuts after at most `hi` chars, preferring the last word boundary at or
    /// beyond `lo`. The head never ends up shorter than `lo`; the tail has its
    /// leading whitespace dropped.
    fn split(self, lo: usize, hi: usize) -> (Span, Option<Span>) {
        let chars: Vec<char> = self.text.chars().collect();
        if chars.len() <= hi {
            return (self, None);
        }

        let lo = lo.max(1).min(hi);
        let boundary = (lo..=hi)
            .rev()
            .find(|&k| chars[k].is_whitespace() && !chars[k - 1].is_whitespace());

        let cut = boundary.unwrap_or(hi);
        let trimmed_len = chars[..cut]
            .iter()
            .rposition(|c| !c.is_whitespace())
            .map_or(0, |i| i + 1);
        // A whitespace run covering the whole window keeps its first part in the head
        let head_len = if trimmed_len < lo { lo } else { trimmed_len };
        let head_text: String = chars[..head_len].iter().collect();
        let head = Span::new(&head_text, self.start);

        let skip = chars[head_len..]
            .iter()
            .take_while(|c| c.is_whitespace())
            .count();
        let tail_start = head_len + skip;
        let tail = (tail_start < chars.len()).then(|| {
            let tail_text: String = chars[tail_start..].iter().collect();
            Span::new(&tail_text, self.start + tail_start)
        });

        (head, tail)
    }
}
