//! Immutable corpus with offset-addressed reads and regex search

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use grep_matcher::Matcher;
use grep_regex::{RegexMatcher, RegexMatcherBuilder};
use grep_searcher::{Searcher, SearcherBuilder, Sink, SinkMatch};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::CorpusError;

/// A single regex match inside the corpus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrepMatch {
    /// 1-based line number of the matching line
    pub line: u64,
    /// Absolute byte offset where the match starts
    pub offset_start: usize,
    /// Absolute byte offset where the match ends (exclusive)
    pub offset_end: usize,
    /// Text of the matching line, without its terminator
    pub text: String,
}

/// The corpus under analysis. Loaded once, never mutated.
#[derive(Debug, Clone)]
pub struct Corpus {
    path: PathBuf,
    content: String,
}

impl Corpus {
    /// Load a corpus from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CorpusError> {
        Self::load_with_limit(path, None)
    }

    /// Load a corpus, reading at most `max_bytes` when given
    pub fn load_with_limit(path: impl AsRef<Path>, max_bytes: Option<usize>) -> Result<Self, CorpusError> {
        let path = path.as_ref().to_path_buf();
        debug!(?path, ?max_bytes, "Corpus::load_with_limit: called");

        let file = fs::File::open(&path).map_err(|e| classify_io(&path, e))?;
        let mut bytes = Vec::new();
        let read = match max_bytes {
            Some(limit) => file.take(limit as u64).read_to_end(&mut bytes),
            None => {
                let mut file = file;
                file.read_to_end(&mut bytes)
            }
        };
        read.map_err(|e| classify_io(&path, e))?;
        if max_bytes.is_some() {
            trim_partial_char(&mut bytes);
        }

        // Lossy decode so a stray invalid byte never aborts a session
        let content = match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => {
                debug!("Corpus::load_with_limit: invalid utf-8, decoding lossily");
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };

        info!(path = %path.display(), len = content.len(), "Loaded corpus");
        Ok(Self { path, content })
    }

    /// Build a corpus from text already in memory
    pub fn from_text(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Corpus length in bytes
    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Return the text in `[start, end)`
    pub fn peek(&self, start: usize, end: usize) -> Result<&str, CorpusError> {
        debug!(start, end, len = self.len(), "Corpus::peek: called");
        if start > end || end > self.len() {
            return Err(CorpusError::Range {
                start,
                end,
                len: self.len(),
            });
        }
        self.content.get(start..end).ok_or(CorpusError::Range {
            start,
            end,
            len: self.len(),
        })
    }

    /// Search every line for `pattern`
    pub fn grep(&self, pattern: &str) -> Result<Vec<GrepMatch>, CorpusError> {
        self.grep_limited(pattern, usize::MAX)
    }

    /// Search for `pattern`, stopping after `max_matches` hits
    pub fn grep_limited(&self, pattern: &str, max_matches: usize) -> Result<Vec<GrepMatch>, CorpusError> {
        debug!(%pattern, max_matches, "Corpus::grep_limited: called");
        let matcher = RegexMatcherBuilder::new()
            .line_terminator(Some(b'\n'))
            .build(pattern)
            .map_err(|e| CorpusError::Pattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?;

        let mut sink = MatchSink {
            matcher: &matcher,
            matches: Vec::new(),
            max_matches,
        };

        let mut searcher = SearcherBuilder::new().line_number(true).build();
        searcher.search_slice(&matcher, self.content.as_bytes(), &mut sink)?;

        debug!(count = sink.matches.len(), "Corpus::grep_limited: search complete");
        Ok(sink.matches)
    }

    /// Fixed-size spans of `size` bytes, each starting `size - overlap` after the previous
    pub fn chunk_indices(&self, size: usize, overlap: usize) -> Result<Vec<(usize, usize)>, CorpusError> {
        debug!(size, overlap, "Corpus::chunk_indices: called");
        if size == 0 {
            return Err(CorpusError::InvalidArgument("size must be > 0".to_string()));
        }
        if overlap >= size {
            return Err(CorpusError::InvalidArgument("overlap must be < size".to_string()));
        }

        let text = self.content.as_str();
        let n = text.len();
        let step = size - overlap;
        let mut spans = Vec::new();
        let mut start = 0usize;

        while start < n {
            let mut end = floor_char_boundary(text, (start + size).min(n));
            if end <= start {
                end = ceil_char_boundary(text, start + 1);
            }
            spans.push((start, end));
            if end >= n {
                break;
            }

            let mut next = floor_char_boundary(text, start + step);
            if next <= start {
                next = ceil_char_boundary(text, start + 1);
            }
            start = next;
        }

        Ok(spans)
    }

    /// Write fixed-size spans to `{prefix}_NNNN.txt` files under `out_dir`
    pub fn write_chunks(
        &self,
        out_dir: impl AsRef<Path>,
        size: usize,
        overlap: usize,
        prefix: &str,
    ) -> Result<Vec<PathBuf>, CorpusError> {
        let out_dir = out_dir.as_ref();
        debug!(?out_dir, size, overlap, %prefix, "Corpus::write_chunks: called");
        let spans = self.chunk_indices(size, overlap)?;
        fs::create_dir_all(out_dir)?;

        let mut paths = Vec::with_capacity(spans.len());
        for (i, (start, end)) in spans.into_iter().enumerate() {
            let chunk_path = out_dir.join(format!("{}_{:04}.txt", prefix, i));
            fs::write(&chunk_path, &self.content[start..end])?;
            paths.push(chunk_path);
        }

        info!(count = paths.len(), dir = %out_dir.display(), "Wrote chunk files");
        Ok(paths)
    }
}

fn classify_io(path: &Path, e: std::io::Error) -> CorpusError {
    if e.kind() == std::io::ErrorKind::NotFound {
        CorpusError::NotFound {
            path: path.to_path_buf(),
        }
    } else {
        CorpusError::Read {
            path: path.to_path_buf(),
            source: e,
        }
    }
}

/// Drop a multi-byte sequence cut off by a read limit
fn trim_partial_char(bytes: &mut Vec<u8>) {
    // A UTF-8 sequence is at most 4 bytes, so only the last 3 can start an unfinished one
    let tail_start = bytes.len().saturating_sub(3);
    let Some(lead) = (tail_start..bytes.len()).rev().find(|&i| bytes[i] & 0xC0 != 0x80) else {
        return;
    };
    if let Err(e) = std::str::from_utf8(&bytes[lead..])
        && e.valid_up_to() == 0
        && e.error_len().is_none()
    {
        debug!(cut = bytes.len() - lead, "trim_partial_char: dropping truncated sequence");
        bytes.truncate(lead);
    }
}

/// Largest char boundary `<= index`
pub(crate) fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    let mut i = index;
    while !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Smallest char boundary `>= index`
pub(crate) fn ceil_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    let mut i = index;
    while !text.is_char_boundary(i) {
        i += 1;
    }
    i
}

struct MatchSink<'m> {
    matcher: &'m RegexMatcher,
    matches: Vec<GrepMatch>,
    max_matches: usize,
}

impl Sink for MatchSink<'_> {
    type Error = std::io::Error;

    fn matched(&mut self, _searcher: &Searcher, mat: &SinkMatch<'_>) -> Result<bool, Self::Error> {
        let line = mat.line_number().unwrap_or(0);
        let line_offset = mat.absolute_byte_offset() as usize;
        let bytes = mat.bytes();
        let text = String::from_utf8_lossy(bytes).trim_end_matches(['\n', '\r']).to_string();

        let mut spans = Vec::new();
        self.matcher
            .find_iter(bytes, |m| {
                spans.push((m.start(), m.end()));
                true
            })
            .map_err(std::io::Error::other)?;

        for (start, end) in spans {
            if self.matches.len() >= self.max_matches {
                return Ok(false);
            }
            self.matches.push(GrepMatch {
                line,
                offset_start: line_offset + start,
                offset_end: line_offset + end,
                text: text.clone(),
            });
        }

        Ok(self.matches.len() < self.max_matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_and_peek() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("corpus.txt");
        fs::write(&path, "Hello world, this is a test of the corpus store.").unwrap();

        let corpus = Corpus::load(&path).unwrap();
        assert_eq!(corpus.len(), 48);
        assert_eq!(corpus.peek(0, 5).unwrap(), "Hello");
        assert_eq!(corpus.peek(48, 48).unwrap(), "");
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = Corpus::load(temp.path().join("missing.txt")).unwrap_err();
        assert!(matches!(err, CorpusError::NotFound { .. }));
    }

    #[test]
    fn test_load_directory_is_read_error() {
        let temp = TempDir::new().unwrap();
        let err = Corpus::load(temp.path()).unwrap_err();
        assert!(matches!(err, CorpusError::Read { .. }));
    }

    #[test]
    fn test_load_with_limit() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("corpus.txt");
        fs::write(&path, "abcdefghij").unwrap();

        let corpus = Corpus::load_with_limit(&path, Some(4)).unwrap();
        assert_eq!(corpus.content(), "abcd");
    }

    #[test]
    fn test_load_with_limit_cuts_on_char_boundary() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("corpus.txt");
        fs::write(&path, "aé€").unwrap();

        let corpus = Corpus::load_with_limit(&path, Some(2)).unwrap();
        assert_eq!(corpus.content(), "a");
        assert_eq!(corpus.len(), 1);

        // Two of the three bytes of the euro sign
        let corpus = Corpus::load_with_limit(&path, Some(5)).unwrap();
        assert_eq!(corpus.content(), "aé");

        let corpus = Corpus::load_with_limit(&path, Some(6)).unwrap();
        assert_eq!(corpus.content(), "aé€");
    }

    #[test]
    fn test_load_with_limit_keeps_earlier_invalid_bytes_lossy() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("corpus.bin");
        fs::write(&path, [b'o', 0xff, b'k', 0xC3, 0xA9]).unwrap();

        let corpus = Corpus::load_with_limit(&path, Some(4)).unwrap();
        assert_eq!(corpus.content(), "o\u{FFFD}k");
    }

    #[test]
    fn test_load_invalid_utf8_is_lossy() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("corpus.bin");
        fs::write(&path, [b'o', b'k', 0xff, b'!']).unwrap();

        let corpus = Corpus::load(&path).unwrap();
        assert!(corpus.content().starts_with("ok"));
        assert!(corpus.content().ends_with('!'));
    }

    #[test]
    fn test_peek_out_of_range() {
        let corpus = Corpus::from_text("mem", "short");
        assert!(matches!(corpus.peek(3, 2), Err(CorpusError::Range { .. })));
        assert!(matches!(corpus.peek(0, 6), Err(CorpusError::Range { .. })));
    }

    #[test]
    fn test_peek_inside_multibyte_char() {
        let corpus = Corpus::from_text("mem", "héllo");
        assert!(matches!(corpus.peek(0, 2), Err(CorpusError::Range { .. })));
        assert_eq!(corpus.peek(0, 3).unwrap(), "hé");
    }

    #[test]
    fn test_grep_offsets() {
        let corpus = Corpus::from_text("mem", "alpha\nbeta TODO one\ngamma\nTODO two\n");
        let matches = corpus.grep("TODO").unwrap();

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].line, 2);
        assert_eq!(matches[0].text, "beta TODO one");
        assert_eq!(corpus.peek(matches[0].offset_start, matches[0].offset_end).unwrap(), "TODO");
        assert_eq!(matches[1].line, 4);
        assert_eq!(corpus.peek(matches[1].offset_start, matches[1].offset_end).unwrap(), "TODO");
    }

    #[test]
    fn test_grep_multiple_matches_on_one_line() {
        let corpus = Corpus::from_text("mem", "a1 b2 c3\n");
        let matches = corpus.grep(r"\d").unwrap();
        assert_eq!(matches.len(), 3);
        assert!(matches.iter().all(|m| m.line == 1));
        assert_eq!(matches[2].offset_start, 7);
    }

    #[test]
    fn test_grep_no_matches() {
        let corpus = Corpus::from_text("mem", "foo bar baz");
        assert!(corpus.grep("notfound").unwrap().is_empty());
    }

    #[test]
    fn test_grep_invalid_regex() {
        let corpus = Corpus::from_text("mem", "foo");
        let err = corpus.grep("[invalid").unwrap_err();
        assert!(matches!(err, CorpusError::Pattern { .. }));
    }

    #[test]
    fn test_grep_limited() {
        let corpus = Corpus::from_text("mem", "x\nx\nx\nx\n");
        assert_eq!(corpus.grep_limited("x", 2).unwrap().len(), 2);
    }

    #[test]
    fn test_chunk_indices_overlap() {
        let corpus = Corpus::from_text("mem", "0123456789");
        let spans = corpus.chunk_indices(4, 1).unwrap();
        assert_eq!(spans, vec![(0, 4), (3, 7), (6, 10)]);
    }

    #[test]
    fn test_chunk_indices_invalid() {
        let corpus = Corpus::from_text("mem", "0123456789");
        assert!(corpus.chunk_indices(0, 0).is_err());
        assert!(corpus.chunk_indices(4, 4).is_err());
        assert!(corpus.chunk_indices(4, 0).is_ok());
    }

    #[test]
    fn test_chunk_indices_empty_corpus() {
        let corpus = Corpus::from_text("mem", "");
        assert!(corpus.chunk_indices(10, 0).unwrap().is_empty());
    }

    #[test]
    fn test_chunk_indices_respect_char_boundaries() {
        let corpus = Corpus::from_text("mem", "ééééé");
        for (start, end) in corpus.chunk_indices(3, 0).unwrap() {
            assert!(corpus.peek(start, end).is_ok());
        }
    }

    #[test]
    fn test_write_chunks() {
        let temp = TempDir::new().unwrap();
        let corpus = Corpus::from_text("mem", "abcdefghij");

        let paths = corpus.write_chunks(temp.path().join("out"), 5, 0, "chunk").unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("chunk_0000.txt"));
        assert_eq!(fs::read_to_string(&paths[1]).unwrap(), "fghij");
    }
}
