//! REPL error types

use std::path::PathBuf;
use thiserror::Error;

use corpusstore::CorpusError;

/// Errors surfaced by REPL commands
#[derive(Debug, Error)]
pub enum ReplError {
    #[error("No session at {path} - run init first")]
    NoSession { path: PathBuf },

    #[error("State file {path} is unreadable ({message}) - run init to start a new session")]
    CorruptState { path: PathBuf, message: String },

    #[error("Failed to write state file {path}: {source}")]
    StateWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corpus {path} changed since init (expected {expected} bytes, found {found}) - run init again")]
    CorpusChanged { path: PathBuf, expected: usize, found: usize },

    #[error("No chunk table - run chunk first")]
    NoChunks,

    #[error("Unknown chunk id {0}")]
    UnknownChunk(usize),

    #[error("Syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("Unknown primitive '{name}' on line {line}")]
    UnknownPrimitive { line: usize, name: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Corpus(#[from] CorpusError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_session_message() {
        let err = ReplError::NoSession {
            path: PathBuf::from(".rlm/state.json"),
        };
        let msg = err.to_string();
        assert!(msg.contains("run init first"));
        assert!(msg.contains(".rlm/state.json"));
    }

    #[test]
    fn test_corpus_error_is_transparent() {
        let err: ReplError = CorpusError::Range {
            start: 5,
            end: 1,
            len: 10,
        }
        .into();
        assert!(err.to_string().starts_with("Invalid range"));
        assert!(matches!(err, ReplError::Corpus(CorpusError::Range { .. })));
    }
}
