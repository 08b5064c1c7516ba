//! Persistent REPL state
//!
//! One JSON document per session. The file's existence is the only record
//! of a live session; every mutating command loads it, applies its change
//! and writes it back through a same-directory rename.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use corpusstore::{Chunk, ChunkSizeController};

use crate::bridge::WaveResult;
use crate::error::ReplError;

/// Layout version written into every state file
pub const STATE_VERSION: u32 = 1;

/// One executed command, kept for `status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    pub command: String,
    pub ok: bool,
}

/// Everything a session remembers between invocations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplState {
    pub version: u32,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub corpus_path: PathBuf,
    /// Byte length of the corpus as loaded at init
    pub corpus_len: usize,
    /// Read cap given to init, reapplied on every reload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bytes: Option<usize>,
    /// Absent until `chunk` has run
    #[serde(default)]
    pub chunk_table: Option<Vec<Chunk>>,
    pub size_controller: ChunkSizeController,
    #[serde(default)]
    pub buffer: Vec<String>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub results: Vec<WaveResult>,
}

impl ReplState {
    pub fn new(corpus_path: PathBuf, corpus_len: usize, max_bytes: Option<usize>, controller: ChunkSizeController) -> Self {
        Self {
            version: STATE_VERSION,
            session_id: uuid::Uuid::now_v7().to_string(),
            created_at: Utc::now(),
            corpus_path,
            corpus_len,
            max_bytes,
            chunk_table: None,
            size_controller: controller,
            buffer: Vec::new(),
            history: Vec::new(),
            results: Vec::new(),
        }
    }

    /// Read the state file at `path`
    pub fn load(path: &Path) -> Result<Self, ReplError> {
        debug!(?path, "ReplState::load: called");
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("ReplState::load: no state file");
                return Err(ReplError::NoSession {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => {
                return Err(ReplError::CorruptState {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                });
            }
        };

        let state: ReplState = serde_json::from_str(&content).map_err(|e| ReplError::CorruptState {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        if state.version != STATE_VERSION {
            return Err(ReplError::CorruptState {
                path: path.to_path_buf(),
                message: format!("unsupported state version {}", state.version),
            });
        }
        state
            .size_controller
            .validate()
            .map_err(|e| ReplError::CorruptState {
                path: path.to_path_buf(),
                message: format!("invalid chunk size controller: {}", e),
            })?;

        debug!(session_id = %state.session_id, "ReplState::load: loaded");
        Ok(state)
    }

    /// Write the state to `path` via a temp file and rename
    pub fn save(&self, path: &Path) -> Result<(), ReplError> {
        debug!(?path, "ReplState::save: called");
        let write_err = |source: std::io::Error| ReplError::StateWrite {
            path: path.to_path_buf(),
            source,
        };

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(write_err)?;

        let json = serde_json::to_string_pretty(self).map_err(|e| write_err(e.into()))?;
        let mut tmp = NamedTempFile::new_in(&parent).map_err(write_err)?;
        tmp.write_all(json.as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(path).map_err(|e| write_err(e.error))?;

        debug!(bytes = json.len(), "ReplState::save: persisted");
        Ok(())
    }

    /// Delete the state file. Returns whether one existed.
    pub fn remove(path: &Path) -> Result<bool, ReplError> {
        debug!(?path, "ReplState::remove: called");
        match fs::remove_file(path) {
            Ok(()) => {
                info!(path = %path.display(), "Removed session state");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("ReplState::remove: nothing to remove");
                Ok(false)
            }
            Err(e) => Err(ReplError::StateWrite {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    pub fn record_history(&mut self, command: impl Into<String>, ok: bool) {
        self.history.push(HistoryEntry {
            at: Utc::now(),
            command: command.into(),
            ok,
        });
    }
}
