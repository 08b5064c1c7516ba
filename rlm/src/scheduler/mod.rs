//! Wave scheduler
//!
//! Processes a chunk table against a query in fixed-size waves of
//! concurrent sub-calls, stopping early once enough confident answers
//! have arrived.

mod config;
mod wave;

pub use config::SchedulerConfig;
pub use wave::{ProcessSummary, WaveScheduler, truncate_chars};
