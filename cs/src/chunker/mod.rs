//! Adaptive, content-aware chunking
//!
//! Splits a corpus at semantic boundaries for its detected content type,
//! greedily packing boundary segments up to a target size that adapts to
//! observed processing latency.

mod content;
mod controller;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use content::{ContentType, detect_content_type, find_boundaries};
pub use controller::{
    ChunkSizeController, ControllerStats, FAST_THRESHOLD_MS, OPTIMAL_TIME_MS, SLOW_THRESHOLD_MS,
};

use crate::config::ChunkerConfig;
use crate::corpus::{Corpus, floor_char_boundary};
use crate::error::CorpusError;

/// A contiguous slice of the corpus, addressed by byte offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: usize,
    pub start: usize,
    pub end: usize,
    pub detected_type: ContentType,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Chunker owning the session's size controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveChunker {
    controller: ChunkSizeController,
}

impl AdaptiveChunker {
    pub fn new(config: &ChunkerConfig) -> Result<Self, CorpusError> {
        let controller = ChunkSizeController::new(config.initial_size, config.min_size, config.max_size)?;
        Ok(Self { controller })
    }

    pub fn from_controller(controller: ChunkSizeController) -> Self {
        Self { controller }
    }

    pub fn controller(&self) -> &ChunkSizeController {
        &self.controller
    }

    pub fn target_size(&self) -> usize {
        self.controller.target_size()
    }

    /// Chunk the corpus with the current target size
    pub fn chunk(&self, corpus: &Corpus, max_chunks: Option<usize>) -> Result<Vec<Chunk>, CorpusError> {
        chunk_content(corpus.content(), self.controller.target_size(), max_chunks)
    }

    /// Feed back one chunk's processing time
    pub fn record_processing_time(&mut self, processing_time_ms: u64) {
        self.controller.record(processing_time_ms);
    }
}

/// Build a chunk table for `content` at `target_size`.
///
/// The table covers `[0, content.len())` exactly once, in order. Without a
/// `max_chunks` cap every chunk is at most `2 * target_size` bytes.
pub fn chunk_content(content: &str, target_size: usize, max_chunks: Option<usize>) -> Result<Vec<Chunk>, CorpusError> {
    debug!(len = content.len(), target_size, ?max_chunks, "chunk_content: called");
    if target_size == 0 {
        return Err(CorpusError::InvalidArgument("target size must be > 0".to_string()));
    }
    if max_chunks == Some(0) {
        return Err(CorpusError::InvalidArgument("max chunks must be > 0".to_string()));
    }

    let content_type = detect_content_type(content);

    if content.is_empty() {
        debug!("chunk_content: empty corpus");
        return Ok(vec![Chunk {
            id: 0,
            start: 0,
            end: 0,
            detected_type: content_type,
        }]);
    }

    let boundaries = find_boundaries(content, content_type);
    let mut spans = pack_segments(content, &boundaries, target_size);

    if let Some(limit) = max_chunks
        && spans.len() > limit
    {
        debug!(count = spans.len(), limit, "chunk_content: merging tail beyond max chunks");
        let tail_start = spans[limit - 1].0;
        spans.truncate(limit - 1);
        spans.push((tail_start, content.len()));
    }

    let chunks: Vec<Chunk> = spans
        .into_iter()
        .enumerate()
        .map(|(id, (start, end))| Chunk {
            id,
            start,
            end,
            detected_type: content_type,
        })
        .collect();

    info!(%content_type, count = chunks.len(), target_size, "Chunked corpus");
    Ok(chunks)
}

/// Greedily pack boundary segments into spans no larger than `target`,
/// slicing any single segment over `2 * target` into fixed pieces.
fn pack_segments(content: &str, boundaries: &[usize], target: usize) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut cur_start = 0usize;
    let mut cur_end = 0usize;

    for seg in boundaries.windows(2) {
        let (seg_start, seg_end) = (seg[0], seg[1]);
        let seg_len = seg_end - seg_start;

        if seg_len > target.saturating_mul(2) {
            if cur_end > cur_start {
                spans.push((cur_start, cur_end));
            }
            slice_fixed(content, seg_start, seg_end, target, &mut spans);
            cur_start = seg_end;
            cur_end = seg_end;
        } else if cur_end > cur_start && (cur_end - cur_start) + seg_len > target {
            spans.push((cur_start, cur_end));
            cur_start = seg_start;
            cur_end = seg_end;
        } else {
            cur_end = seg_end;
        }
    }

    if cur_end > cur_start {
        spans.push((cur_start, cur_end));
    }

    spans
}

/// Cut `[start, end)` into `target`-sized pieces on char boundaries
fn slice_fixed(content: &str, start: usize, end: usize, target: usize, spans: &mut Vec<(usize, usize)>) {
    let mut pos = start;
    while pos < end {
        let mut next = floor_char_boundary(content, (pos + target).min(end));
        if next <= pos {
            // Target smaller than one char; take the whole char
            next = pos + content[pos..].chars().next().map(char::len_utf8).unwrap_or(1);
        }
        spans.push((pos, next));
        pos = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assert_covers(chunks: &[Chunk], len: usize) {
        assert!(!chunks.is_empty());
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks.last().unwrap().end, len);
        for (i, pair) in chunks.windows(2).enumerate() {
            assert_eq!(pair[0].end, pair[1].start, "gap or overlap after chunk {}", i);
        }
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.id, i);
            assert!(c.start <= c.end);
        }
    }

    fn markdown_corpus() -> String {
        // 20 evenly spaced level-2 headings across 100,000 characters
        let line = "lorem ipsum dolor sit amet\n";
        let mut text = String::new();
        for i in 0..20 {
            let section_end = (i + 1) * 5_000;
            text.push_str(&format!("## Section {:02}\n", i));
            while text.len() + line.len() < section_end {
                text.push_str(line);
            }
            while text.len() < section_end - 1 {
                text.push('.');
            }
            text.push('\n');
        }
        text
    }

    #[test]
    fn test_empty_corpus_single_zero_chunk() {
        let chunks = chunk_content("", 100, None).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!((chunks[0].start, chunks[0].end), (0, 0));
        assert_eq!(chunks[0].detected_type, ContentType::Text);
    }

    #[test]
    fn test_markdown_scenario() {
        let text = markdown_corpus();
        assert_eq!(text.len(), 100_000);

        let chunks = chunk_content(&text, 10_000, None).unwrap();
        assert_covers(&chunks, text.len());
        assert!((8..=12).contains(&chunks.len()), "got {} chunks", chunks.len());

        let headings: Vec<usize> = text.match_indices("## Section").map(|(i, _)| i).collect();
        for c in &chunks[1..chunks.len() - 1] {
            assert!(headings.contains(&c.start), "chunk {} starts off-heading at {}", c.id, c.start);
        }
        assert!(chunks.iter().all(|c| c.detected_type == ContentType::Markdown));
    }

    #[test]
    fn test_dense_single_line_is_bounded() {
        let text = "x".repeat(1_000_000);
        let chunks = chunk_content(&text, 10_000, None).unwrap();
        assert_covers(&chunks, text.len());
        assert!(chunks.iter().all(|c| c.len() <= 20_000));
        assert_eq!(chunks.len(), 100);
    }

    #[test]
    fn test_dense_multibyte_stays_on_char_boundaries() {
        let text = "é".repeat(10_001);
        let chunks = chunk_content(&text, 1_001, None).unwrap();
        assert_covers(&chunks, text.len());
        for c in &chunks {
            assert!(text.is_char_boundary(c.start) && text.is_char_boundary(c.end));
            assert!(c.len() <= 2_002);
        }
    }

    #[test]
    fn test_max_chunks_merges_tail() {
        let text = "x".repeat(1_000);
        let chunks = chunk_content(&text, 100, Some(3)).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_covers(&chunks, text.len());
        assert_eq!(chunks[2].start, 200);
        assert_eq!(chunks[2].end, 1_000);
    }

    #[test]
    fn test_max_chunks_zero_is_invalid() {
        assert!(chunk_content("abc", 10, Some(0)).is_err());
        assert!(chunk_content("abc", 0, None).is_err());
    }

    #[test]
    fn test_small_paragraphs_pack_together() {
        let text = "aaaa\n\nbbbb\n\ncccc\n\ndddd";
        let chunks = chunk_content(text, 12, None).unwrap();
        assert_covers(&chunks, text.len());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].start, text.find("cccc").unwrap());
    }

    #[test]
    fn test_adaptive_chunker_uses_controller_target() {
        let config = ChunkerConfig {
            initial_size: 100,
            min_size: 50,
            max_size: 1_000,
        };
        let mut chunker = AdaptiveChunker::new(&config).unwrap();
        let corpus = Corpus::from_text("mem", "y".repeat(1_000));

        assert_eq!(chunker.chunk(&corpus, None).unwrap().len(), 10);

        chunker.record_processing_time(100);
        assert_eq!(chunker.target_size(), 120);
        assert_eq!(chunker.chunk(&corpus, None).unwrap()[0].len(), 120);
    }

    proptest! {
        #[test]
        fn prop_chunks_cover_and_stay_bounded(
            text in "(## h\n|\\[2024-01-01\\] l\n|def f\n|[a-z ]{0,40}\n|\n\n|é){0,200}",
            target in 1usize..300,
        ) {
            let chunks = chunk_content(&text, target, None).unwrap();
            prop_assert_eq!(chunks[0].start, 0);
            prop_assert_eq!(chunks.last().unwrap().end, text.len());
            for pair in chunks.windows(2) {
                prop_assert_eq!(pair[0].end, pair[1].start);
            }
            for c in &chunks {
                prop_assert!(c.len() <= (2 * target).max(4));
                prop_assert!(text.is_char_boundary(c.start) && text.is_char_boundary(c.end));
            }
        }
    }
}
