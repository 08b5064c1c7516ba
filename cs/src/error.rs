//! Corpus store error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by corpus loading, reads and chunking
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("Corpus file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to read corpus {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid range {start}..{end} for corpus of {len} bytes")]
    Range { start: usize, end: usize, len: usize },

    #[error("Invalid regex pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
