//! A loaded session: state file, corpus and chunker together

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use corpusstore::{AdaptiveChunker, Chunk, ChunkerConfig, ControllerStats, Corpus, chunk_content};

use crate::bridge::{SubcallBridge, SubcallRequest, WaveResult, call_timed};
use crate::error::ReplError;
use crate::scheduler::{ProcessSummary, WaveScheduler, truncate_chars};
use crate::state::ReplState;

/// Read-only view printed by `status`
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub corpus_path: PathBuf,
    pub corpus_len: usize,
    pub chunk_count: Option<usize>,
    pub buffer_count: usize,
    pub result_count: usize,
    pub command_count: usize,
    pub target_size: usize,
}

pub struct Session {
    state_path: PathBuf,
    state: ReplState,
    corpus: Corpus,
    chunker: AdaptiveChunker,
}

impl Session {
    /// Start a fresh session over `corpus_path`, replacing any previous one
    pub fn init(
        corpus_path: &Path,
        state_path: &Path,
        chunker_config: &ChunkerConfig,
        max_bytes: Option<usize>,
    ) -> Result<Self, ReplError> {
        debug!(?corpus_path, ?state_path, ?max_bytes, "Session::init: called");
        let corpus = Corpus::load_with_limit(corpus_path, max_bytes)?;
        let chunker = AdaptiveChunker::new(chunker_config)?;
        let state = ReplState::new(
            corpus_path.to_path_buf(),
            corpus.len(),
            max_bytes,
            chunker.controller().clone(),
        );

        let session = Self {
            state_path: state_path.to_path_buf(),
            state,
            corpus,
            chunker,
        };
        session.save()?;
        info!(session_id = %session.state.session_id, corpus_len = session.corpus.len(), "Session initialised");
        Ok(session)
    }

    /// Reopen the session stored at `state_path`
    pub fn open(state_path: &Path) -> Result<Self, ReplError> {
        debug!(?state_path, "Session::open: called");
        let state = ReplState::load(state_path)?;
        let corpus = Corpus::load_with_limit(&state.corpus_path, state.max_bytes)?;

        if corpus.len() != state.corpus_len {
            return Err(ReplError::CorpusChanged {
                path: state.corpus_path.clone(),
                expected: state.corpus_len,
                found: corpus.len(),
            });
        }

        let chunker = AdaptiveChunker::from_controller(state.size_controller.clone());
        Ok(Self {
            state_path: state_path.to_path_buf(),
            state,
            corpus,
            chunker,
        })
    }

    /// Remove the session at `state_path`; a missing session is not an error
    pub fn reset(state_path: &Path) -> Result<bool, ReplError> {
        ReplState::remove(state_path)
    }

    pub fn save(&self) -> Result<(), ReplError> {
        self.state.save(&self.state_path)
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn state(&self) -> &ReplState {
        &self.state
    }

    pub fn chunks(&self) -> Option<&[Chunk]> {
        self.state.chunk_table.as_deref()
    }

    pub fn controller_stats(&self) -> ControllerStats {
        self.chunker.controller().stats()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            session_id: self.state.session_id.clone(),
            created_at: self.state.created_at,
            corpus_path: self.state.corpus_path.clone(),
            corpus_len: self.corpus.len(),
            chunk_count: self.state.chunk_table.as_ref().map(Vec::len),
            buffer_count: self.state.buffer.len(),
            result_count: self.state.results.len(),
            command_count: self.state.history.len(),
            target_size: self.chunker.target_size(),
        }
    }

    /// Rebuild the chunk table, replacing any previous one
    pub fn chunk(&mut self, max_chunks: Option<usize>, target_size: Option<usize>) -> Result<&[Chunk], ReplError> {
        debug!(?max_chunks, ?target_size, "Session::chunk: called");
        let chunks = match target_size {
            Some(target) => chunk_content(self.corpus.content(), target, max_chunks)?,
            None => self.chunker.chunk(&self.corpus, max_chunks)?,
        };
        let table = self.state.chunk_table.insert(chunks);
        Ok(table.as_slice())
    }

    /// Run `query` over the chunk table and append every result
    pub async fn process(&mut self, query: &str, scheduler: &WaveScheduler) -> Result<ProcessSummary, ReplError> {
        debug!(%query, "Session::process: called");
        let chunks = self.state.chunk_table.as_deref().ok_or(ReplError::NoChunks)?;
        let summary = scheduler.process(&self.corpus, chunks, query, &mut self.chunker).await?;

        self.state.results.extend(summary.results.iter().cloned());
        self.state.size_controller = self.chunker.controller().clone();
        Ok(summary)
    }

    /// Send one chunk from the table to the bridge with a custom prompt
    pub async fn sub_call(
        &mut self,
        bridge: &dyn SubcallBridge,
        prompt: &str,
        chunk_id: usize,
        timeout: Duration,
        max_payload_chars: usize,
    ) -> Result<WaveResult, ReplError> {
        debug!(chunk_id, "Session::sub_call: called");
        let chunk = self
            .chunks()
            .ok_or(ReplError::NoChunks)?
            .get(chunk_id)
            .copied()
            .ok_or(ReplError::UnknownChunk(chunk_id))?;
        let text = self.corpus.peek(chunk.start, chunk.end)?;

        let request = SubcallRequest {
            chunk_id,
            query: prompt.to_string(),
            content: truncate_chars(text, max_payload_chars).to_string(),
            timeout,
        };
        let result = call_timed(bridge, request).await;

        if result.dispatched {
            self.chunker.record_processing_time(result.elapsed_ms);
            self.state.size_controller = self.chunker.controller().clone();
        }
        self.state.results.push(result.clone());
        Ok(result)
    }

    /// Append a note to the buffer; returns the new buffer count
    pub fn add_buffer(&mut self, text: impl Into<String>) -> usize {
        self.state.buffer.push(text.into());
        self.state.buffer.len()
    }

    /// Write all buffers to `path`, separated by blank lines
    pub fn export_buffers(&self, path: &Path) -> Result<usize, ReplError> {
        debug!(?path, count = self.state.buffer.len(), "Session::export_buffers: called");
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.state.buffer.join("\n\n"))?;
        Ok(self.state.buffer.len())
    }

    pub fn record_history(&mut self, command: impl Into<String>, ok: bool) {
        self.state.record_history(command, ok);
    }
}
