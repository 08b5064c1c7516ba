//! rlm - recursive-context processing engine
//!
//! Keeps exploration state over a corpus too large for one context window,
//! chunks it adaptively, and fans a query out to sub-calls in bounded waves
//! until enough confident answers arrive.
//!
//! # Example
//!
//! ```ignore
//! use rlm::{Session, WaveScheduler, bridge_from_config, config::Config};
//!
//! let config = Config::load(None)?;
//! let mut session = Session::init("big.log".as_ref(), &config.state_path, &config.chunker, None)?;
//! session.chunk(None, None)?;
//!
//! let bridge = bridge_from_config(&config.subcall);
//! let scheduler = WaveScheduler::new(config.scheduler.clone(), bridge, config.subcall.timeout())?;
//! let summary = session.process("which requests failed?", &scheduler).await?;
//! session.save()?;
//! ```

pub mod bridge;
pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod scheduler;
pub mod session;
pub mod state;

pub use bridge::{SubcallBridge, SubcallConfig, SubcallRequest, WaveResult, bridge_from_config};
pub use error::ReplError;
pub use scheduler::{ProcessSummary, SchedulerConfig, WaveScheduler};
pub use session::{Session, SessionStatus};
pub use state::ReplState;
