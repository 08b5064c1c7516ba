//! Latency-driven chunk size controller

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CorpusError;

/// Below this processing time the target grows
pub const FAST_THRESHOLD_MS: u64 = 5_000;

/// Above this processing time the target shrinks
pub const SLOW_THRESHOLD_MS: u64 = 15_000;

/// Latency band centre the controller steers toward
pub const OPTIMAL_TIME_MS: u64 = 10_000;

const GROW_FACTOR: f64 = 1.2;
const SHRINK_FACTOR: f64 = 0.7;

/// Number of processing times kept for statistics
const HISTORY_LIMIT: usize = 32;

/// Increase/decrease controller for the chunk target size.
///
/// `min_size <= target_size <= max_size` holds after every operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkSizeController {
    target_size: usize,
    min_size: usize,
    max_size: usize,
    recent_times: VecDeque<u64>,
    adjustments: u64,
}

/// Snapshot of controller behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerStats {
    pub current_size: usize,
    pub min_size: usize,
    pub max_size: usize,
    pub optimal_time_ms: u64,
    /// Completed chunks fed back so far
    pub adjustments_made: u64,
    /// Average over the retained history
    pub avg_processing_time_ms: f64,
    /// Retained times that fell outside the latency band
    pub size_adjustments: usize,
}

impl ChunkSizeController {
    /// Create a controller; `initial` is clamped into `[min, max]`
    pub fn new(initial: usize, min_size: usize, max_size: usize) -> Result<Self, CorpusError> {
        debug!(initial, min_size, max_size, "ChunkSizeController::new: called");
        check_bounds(min_size, max_size)?;

        Ok(Self {
            target_size: initial.clamp(min_size, max_size),
            min_size,
            max_size,
            recent_times: VecDeque::with_capacity(HISTORY_LIMIT),
            adjustments: 0,
        })
    }

    /// Check the size invariant on a controller that was deserialized rather than built
    pub fn validate(&self) -> Result<(), CorpusError> {
        check_bounds(self.min_size, self.max_size)?;
        if !(self.min_size..=self.max_size).contains(&self.target_size) {
            return Err(CorpusError::InvalidArgument(format!(
                "target chunk size {} outside {}..={}",
                self.target_size, self.min_size, self.max_size
            )));
        }
        Ok(())
    }

    pub fn target_size(&self) -> usize {
        self.target_size
    }

    pub fn min_size(&self) -> usize {
        self.min_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn recent_times(&self) -> impl Iterator<Item = u64> + '_ {
        self.recent_times.iter().copied()
    }

    /// Feed back one completed chunk's processing time
    pub fn record(&mut self, processing_time_ms: u64) {
        if self.recent_times.len() == HISTORY_LIMIT {
            self.recent_times.pop_front();
        }
        self.recent_times.push_back(processing_time_ms);
        self.adjustments += 1;

        let before = self.target_size;
        if processing_time_ms < FAST_THRESHOLD_MS {
            // Always move by at least one byte so tiny targets still converge
            let grown = ((self.target_size as f64 * GROW_FACTOR).round() as usize).max(self.target_size + 1);
            self.target_size = grown.min(self.max_size);
        } else if processing_time_ms > SLOW_THRESHOLD_MS {
            let shrunk = ((self.target_size as f64 * SHRINK_FACTOR).round() as usize).min(self.target_size - 1);
            self.target_size = shrunk.max(self.min_size);
        }

        debug!(processing_time_ms, before, after = self.target_size, "ChunkSizeController::record: adjusted");
    }

    pub fn stats(&self) -> ControllerStats {
        let avg = if self.recent_times.is_empty() {
            0.0
        } else {
            self.recent_times.iter().sum::<u64>() as f64 / self.recent_times.len() as f64
        };

        ControllerStats {
            current_size: self.target_size,
            min_size: self.min_size,
            max_size: self.max_size,
            optimal_time_ms: OPTIMAL_TIME_MS,
            adjustments_made: self.adjustments,
            avg_processing_time_ms: avg,
            size_adjustments: self
                .recent_times
                .iter()
                .filter(|t| **t < FAST_THRESHOLD_MS || **t > SLOW_THRESHOLD_MS)
                .count(),
        }
    }
}

fn check_bounds(min_size: usize, max_size: usize) -> Result<(), CorpusError> {
    if min_size == 0 {
        return Err(CorpusError::InvalidArgument("min chunk size must be > 0".to_string()));
    }
    if min_size > max_size {
        return Err(CorpusError::InvalidArgument(format!(
            "min chunk size {} exceeds max chunk size {}",
            min_size, max_size
        )));
    }
    Ok(())
}
