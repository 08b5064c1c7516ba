//! Wave scheduler configuration

use serde::{Deserialize, Serialize};

/// Configuration for the wave scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Chunks dispatched together in one wave
    #[serde(rename = "max-concurrent")]
    pub max_concurrent: usize,

    /// Confidence a result must exceed to count toward early stop
    #[serde(rename = "min-confidence")]
    pub min_confidence: f64,

    /// Confident results needed before remaining waves are skipped
    #[serde(rename = "min-confident-results")]
    pub min_confident_results: usize,

    /// Chunk content is cut to this many characters before dispatch
    #[serde(rename = "max-payload-chars")]
    pub max_payload_chars: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            min_confidence: 0.8,
            min_confident_results: 3,
            max_payload_chars: 5_000,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent == 0 {
            return Err("scheduler.max-concurrent must be > 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err("scheduler.min-confidence must be within [0, 1]".to_string());
        }
        Ok(())
    }
}
