//! Content-type detection and semantic boundary discovery

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::corpus::floor_char_boundary;

/// How much of the corpus head is inspected for line-prefix heuristics
const DETECT_SAMPLE_BYTES: usize = 4096;

/// Detected structure of a corpus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Json,
    Markdown,
    Log,
    Code,
    Text,
}

impl ContentType {
    /// Human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            ContentType::Json => "JSON",
            ContentType::Markdown => "Markdown",
            ContentType::Log => "Log",
            ContentType::Code => "Code",
            ContentType::Text => "Plain Text",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContentType::Json => "json",
            ContentType::Markdown => "markdown",
            ContentType::Log => "log",
            ContentType::Code => "code",
            ContentType::Text => "text",
        };
        write!(f, "{}", s)
    }
}

static MARKDOWN_LEAD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#{1,6}\s").expect("valid regex"));
static LOG_LEAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[\d{4}-\d{2}-\d{2}[\]T ]").expect("valid regex"));
static CODE_LEAD: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^(import|def|class|from|function|const|let|var|interface|type|use|fn|mod|struct|package|#include)\s+",
        r"^(public|private|protected|async|await|pub|export|static)\s+",
        r"^(if|for|while|switch|try|catch|return)\s*\(",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static MARKDOWN_SPLIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#{2,4}[ \t]").expect("valid regex"));
static JSON_SPLIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^[\{\[]").expect("valid regex"));
static LOG_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\[\d{4}-\d{2}-\d{2}[\]T ]").expect("valid regex"));
static CODE_SPLIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^(?:(?:pub(?:\([^)]*\))?|public|private|protected|static|async|export|abstract|final)\s+)*(?:def|class|function|fn|interface|type|struct|enum|trait|impl)\b",
    )
    .expect("valid regex")
});
static TEXT_SPLIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n[ \t]*\n\s*").expect("valid regex"));

/// Classify a corpus. First matching rule wins: JSON, Markdown, Log, Code, Text.
pub fn detect_content_type(content: &str) -> ContentType {
    let trimmed = content.trim();
    debug!(len = trimmed.len(), "detect_content_type: called");

    if (trimmed.starts_with('{') && trimmed.ends_with('}')) || (trimmed.starts_with('[') && trimmed.ends_with(']')) {
        return ContentType::Json;
    }

    let sample = &trimmed[..floor_char_boundary(trimmed, DETECT_SAMPLE_BYTES)];

    if MARKDOWN_LEAD.is_match(sample) {
        return ContentType::Markdown;
    }
    if LOG_LEAD.is_match(sample) {
        return ContentType::Log;
    }
    if CODE_LEAD.iter().any(|re| re.is_match(sample)) {
        return ContentType::Code;
    }

    ContentType::Text
}

/// Candidate split offsets for `content`, anchored with `0` and `content.len()`
pub fn find_boundaries(content: &str, content_type: ContentType) -> Vec<usize> {
    let mut boundaries = vec![0];

    match content_type {
        ContentType::Markdown => boundaries.extend(MARKDOWN_SPLIT.find_iter(content).map(|m| m.start())),
        ContentType::Json => boundaries.extend(JSON_SPLIT.find_iter(content).map(|m| m.start())),
        ContentType::Log => boundaries.extend(LOG_SPLIT.find_iter(content).map(|m| m.start())),
        ContentType::Code => boundaries.extend(CODE_SPLIT.find_iter(content).map(|m| m.start())),
        ContentType::Text => boundaries.extend(TEXT_SPLIT.find_iter(content).map(|m| m.end())),
    }

    boundaries.push(content.len());
    boundaries.sort_unstable();
    boundaries.dedup();

    debug!(%content_type, count = boundaries.len(), "find_boundaries: complete");
    boundaries
}
