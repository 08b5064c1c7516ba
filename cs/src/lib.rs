//! CorpusStore - immutable corpus access and adaptive chunking
//!
//! Loads a text corpus once and exposes offset-addressed reads, regex
//! search, and a content-aware chunker whose target size adapts to how long
//! each chunk takes to process downstream.
//!
//! # Example
//!
//! ```ignore
//! use corpusstore::{AdaptiveChunker, ChunkerConfig, Corpus};
//!
//! let corpus = Corpus::load("docs/big.md")?;
//! let hits = corpus.grep("RLM.*recursive")?;
//! let chunker = AdaptiveChunker::new(&ChunkerConfig::default())?;
//! let chunks = chunker.chunk(&corpus, None)?;
//! let text = corpus.peek(chunks[0].start, chunks[0].end)?;
//! ```

pub mod chunker;
pub mod cli;
pub mod config;
mod corpus;
mod error;

pub use chunker::{AdaptiveChunker, Chunk, ChunkSizeController, ContentType, ControllerStats, chunk_content};
pub use config::ChunkerConfig;
pub use corpus::{Corpus, GrepMatch};
pub use error::CorpusError;

/// Default starting chunk size (50KB)
pub const DEFAULT_INITIAL_CHUNK_SIZE: usize = 50_000;

/// Default lower bound for the chunk size (10KB)
pub const DEFAULT_MIN_CHUNK_SIZE: usize = 10_000;

/// Default upper bound for the chunk size (200KB)
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 200_000;
