//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::exec::DEFAULT_MAX_OUTPUT_CHARS;

/// rlm - recursive-context processing over large corpora
#[derive(Parser, Debug)]
#[command(
    name = "rlm",
    about = "Explore a large corpus in chunks and fan queries out to sub-calls",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Path to the session state file
    #[arg(long, global = true, help = "Path to the session state file (default .rlm/state.json)")]
    pub state: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a new session over a corpus file
    Init {
        /// Corpus file
        context: PathBuf,

        /// Read at most this many bytes of the corpus
        #[arg(long)]
        max_bytes: Option<usize>,
    },

    /// Run primitive calls against the session (code from -c or stdin)
    Exec {
        /// Snippet to run; read from stdin when omitted
        #[arg(short = 'c', long = "code")]
        code: Option<String>,

        /// Truncate printed output to this many characters
        #[arg(long, default_value_t = DEFAULT_MAX_OUTPUT_CHARS)]
        max_output_chars: usize,
    },

    /// Show the current session
    Status {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Delete the session state
    Reset,

    /// Build the adaptive chunk table
    Chunk {
        /// Maximum number of chunks; the last chunk absorbs the remainder
        #[arg(short, long)]
        max_chunks: Option<usize>,

        /// Use this target size instead of the adaptive one
        #[arg(short, long)]
        target_size: Option<usize>,
    },

    /// Run a query over every chunk in waves of sub-calls
    Process {
        /// Query sent with each chunk
        query: String,

        /// Override scheduler.max-concurrent
        #[arg(long)]
        max_concurrent: Option<usize>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Write all buffers to a file
    ExportBuffers {
        /// Output file
        out: PathBuf,
    },

    /// Show chunk size controller statistics
    Stats {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

impl Command {
    /// Name recorded in the session history
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::Exec { .. } => "exec",
            Self::Status { .. } => "status",
            Self::Reset => "reset",
            Self::Chunk { .. } => "chunk",
            Self::Process { .. } => "process",
            Self::ExportBuffers { .. } => "export-buffers",
            Self::Stats { .. } => "stats",
        }
    }
}

/// Output format for status/process/stats
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
