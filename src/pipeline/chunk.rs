//! Segmentation: split extracted text into bounded, overlapping segments.
//!
//! The backend accepts a bounded amount of input per call, so long documents
//! are cut into windows of at most `max_chars` characters. Adjacent windows
//! share `overlap` characters so a sentence straddling a cut is seen whole
//! by at least one call.
//!
//! ## Cut placement
//!
//! When a window does not reach the end of the text, the planner looks
//! backwards from the window edge for a sentence terminator (`.`, `!`, `?`)
//! followed by whitespace and cuts right after it. A boundary must lie past
//! the overlap, so the next window always starts later than this one. With
//! no such boundary the window edge is used as-is (hard cut).
//!
//! Prose with a sentence end in the last half-stride (`max_chars - overlap`)
//! of every window advances by at least half the stride per step, which
//! keeps the segment count within `2 · ⌈len / stride⌉ + 1`.
//!
//! All offsets are in `char`s, never bytes, so multi-byte text is never
//! split inside a code point.

use crate::config::PipelineConfig;
use crate::error::QuizError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Where a body of text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Concatenation of every page.
    WholeDocument,
    /// A single page (1-based).
    Page(usize),
}

impl Origin {
    /// The page number, if this body is a single page.
    pub fn page(self) -> Option<usize> {
        match self {
            Origin::WholeDocument => None,
            Origin::Page(n) => Some(n),
        }
    }
}

/// Text produced by the extraction step. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBody {
    content: String,
    origin: Origin,
}

impl TextBody {
    pub fn new(content: impl Into<String>, origin: Origin) -> Self {
        Self {
            content: content.into(),
            origin,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Length in characters.
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// A contiguous slice of a [`TextBody`], the unit of backend invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Position in the request's segment sequence (0-based).
    pub index: usize,
    /// Start offset in characters, inclusive.
    pub start: usize,
    /// End offset in characters, exclusive.
    pub end: usize,
    pub text: String,
    pub origin: Origin,
}

impl Segment {
    pub fn char_len(&self) -> usize {
        self.end - self.start
    }
}

/// Splits text bodies into overlap-aware segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlanner {
    max_chars: usize,
    overlap: usize,
}

impl ChunkPlanner {
    /// Rejects `overlap >= max_chars`, which could never make progress.
    pub fn new(max_chars: usize, overlap: usize) -> Result<Self, QuizError> {
        if max_chars == 0 {
            return Err(QuizError::InvalidConfig(
                "maximum chunk size must be ≥ 1".into(),
            ));
        }
        if overlap >= max_chars {
            return Err(QuizError::InvalidConfig(format!(
                "chunk overlap ({overlap}) must be smaller than the maximum chunk size ({max_chars})"
            )));
        }
        Ok(Self { max_chars, overlap })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self, QuizError> {
        Self::new(config.max_chunk_chars, config.chunk_overlap)
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Plan every body in order, numbering segments across bodies.
    pub fn plan_all(&self, bodies: &[TextBody]) -> Vec<Segment> {
        let mut segments = Vec::new();
        for body in bodies {
            for mut segment in self.plan(body) {
                segment.index = segments.len();
                segments.push(segment);
            }
        }
        segments
    }

    /// Plan a single body. Segment indices start at 0.
    pub fn plan(&self, body: &TextBody) -> Vec<Segment> {
        let text = body.content();
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();

        if total <= self.max_chars {
            return vec![Segment {
                index: 0,
                start: 0,
                end: total,
                text: text.to_string(),
                origin: body.origin(),
            }];
        }

        let mut segments = Vec::new();
        let mut start = 0;

        loop {
            let window_end = (start + self.max_chars).min(total);
            let cut = if window_end < total {
                self.sentence_cut(&chars, start, window_end)
                    .unwrap_or(window_end)
            } else {
                window_end
            };

            segments.push(Segment {
                index: segments.len(),
                start,
                end: cut,
                text: chars[start..cut].iter().collect(),
                origin: body.origin(),
            });

            if cut == total {
                break;
            }
            start = cut - self.overlap;
        }

        debug!(
            "Planned {} segments for {} chars ({:?})",
            segments.len(),
            total,
            body.origin()
        );
        segments
    }

    /// Latest cut in `(start + overlap, window_end]` that sits right after a
    /// sentence terminator plus whitespace.
    fn sentence_cut(&self, chars: &[char], start: usize, window_end: usize) -> Option<usize> {
        let min_cut = (start + self.overlap + 1).max(start + 2);

        (min_cut..=window_end)
            .rev()
            .find(|&cut| is_terminator(chars[cut - 2]) && chars[cut - 1].is_whitespace())
    }
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(text: &str) -> TextBody {
        TextBody::new(text, Origin::WholeDocument)
    }

    /// Concatenate segments, dropping the prefix each shares with its predecessor.
    fn reassemble(segments: &[Segment]) -> String {
        let mut out = String::new();
        let mut prev_end: usize = 0;
        for s in segments {
            let skip = prev_end.saturating_sub(s.start);
            out.extend(s.text.chars().skip(skip));
            prev_end = s.end;
        }
        out
    }

    fn sentences(n: usize) -> String {
        (0..n)
            .map(|i| format!("Sentence number {i} talks about cell biology."))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn short_text_is_one_segment() {
        let planner = ChunkPlanner::new(100, 10).unwrap();
        let segs = planner.plan(&body("Just a short note."));
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].text, "Just a short note.");
        assert_eq!((segs[0].start, segs[0].end), (0, 18));
    }

    #[test]
    fn text_exactly_max_is_one_segment() {
        let text = "a".repeat(50);
        let segs = ChunkPlanner::new(50, 5).unwrap().plan(&body(&text));
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].text, text);
    }

    #[test]
    fn long_text_cuts_after_sentences_and_reassembles() {
        let text = sentences(40);
        let planner = ChunkPlanner::new(300, 40).unwrap();
        let segs = planner.plan(&body(&text));

        assert!(segs.len() > 1);
        for (i, s) in segs.iter().enumerate() {
            assert!(s.char_len() <= 300, "segment {i} is {} chars", s.char_len());
            assert_eq!(s.index, i);
            if i + 1 < segs.len() {
                assert!(s.text.ends_with(". "), "segment {i} ends mid-sentence: {:?}", s.text);
            }
        }
        assert_eq!(reassemble(&segs), text);
    }

    #[test]
    fn adjacent_segments_overlap_by_configured_amount() {
        let text = sentences(30);
        let segs = ChunkPlanner::new(200, 25).unwrap().plan(&body(&text));
        for pair in segs.windows(2) {
            assert_eq!(pair[0].end - pair[1].start, 25);
            assert!(pair[1].start > pair[0].start);
        }
        assert_eq!(segs[0].start, 0);
        assert_eq!(segs.last().unwrap().end, text.chars().count());
    }

    #[test]
    fn no_boundary_falls_back_to_hard_cut() {
        let text = "x".repeat(1000);
        let segs = ChunkPlanner::new(300, 50).unwrap().plan(&body(&text));
        assert_eq!(segs[0].char_len(), 300);
        assert_eq!(segs[1].start, 250);
        assert_eq!(reassemble(&segs), text);
    }

    #[test]
    fn early_boundary_is_ignored_so_progress_is_kept() {
        // The only terminator sits right at the start of every window.
        let text = format!("A. {}", "y".repeat(500));
        let segs = ChunkPlanner::new(100, 60).unwrap().plan(&body(&text));
        for pair in segs.windows(2) {
            assert!(pair[1].start > pair[0].start);
        }
        assert_eq!(reassemble(&segs), text);
    }

    #[test]
    fn early_sentence_end_beats_hard_cut() {
        let text = format!("{}. {}", "a".repeat(1499), "b".repeat(5000));
        let segs = ChunkPlanner::new(3800, 200).unwrap().plan(&body(&text));
        assert_eq!(segs[0].end, 1501);
        assert!(segs[0].text.ends_with(". "));
        assert_eq!(segs[1].start, 1301);
        assert_eq!(reassemble(&segs), text);
    }

    #[test]
    fn segment_count_is_bounded_by_stride() {
        for (max, overlap) in [(120, 0), (120, 30), (120, 119), (500, 200)] {
            let text = sentences(60);
            let total = text.chars().count();
            let segs = ChunkPlanner::new(max, overlap).unwrap().plan(&body(&text));
            let stride = max - overlap;
            let bound = 2 * total.div_ceil(stride) + 1;
            assert!(
                segs.len() <= bound,
                "max={max} overlap={overlap}: {} segments > {bound}",
                segs.len()
            );
            assert_eq!(reassemble(&segs), text);
        }
    }

    #[test]
    fn multibyte_text_is_split_on_char_offsets() {
        let text = "Épreuve réussie. 漢字のテキストです。 ".repeat(40);
        let segs = ChunkPlanner::new(64, 8).unwrap().plan(&body(&text));
        assert!(segs.len() > 1);
        for s in &segs {
            assert_eq!(s.text.chars().count(), s.char_len());
        }
        assert_eq!(reassemble(&segs), text);
    }

    #[test]
    fn invalid_overlap_rejected() {
        assert!(ChunkPlanner::new(100, 100).is_err());
        assert!(ChunkPlanner::new(100, 150).is_err());
        assert!(ChunkPlanner::new(0, 0).is_err());
        assert!(ChunkPlanner::new(100, 99).is_ok());
    }

    #[test]
    fn plan_all_numbers_across_pages() {
        let planner = ChunkPlanner::new(120, 10).unwrap();
        let bodies = vec![
            TextBody::new(sentences(6), Origin::Page(1)),
            TextBody::new("Short page.", Origin::Page(2)),
        ];
        let segs = planner.plan_all(&bodies);
        let indices: Vec<usize> = segs.iter().map(|s| s.index).collect();
        assert_eq!(indices, (0..segs.len()).collect::<Vec<_>>());
        assert_eq!(segs.last().unwrap().origin, Origin::Page(2));
        assert_eq!(segs[0].origin.page(), Some(1));
    }
}
