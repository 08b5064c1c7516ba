//! CLI argument parsing for corpusstore

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cs")]
#[command(author, version, about = "Corpus inspection and adaptive chunking", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Detect the content type of a file
    Detect {
        /// File to analyze
        #[arg(required = true)]
        file: PathBuf,
    },

    /// Split a file into adaptive chunks and write them out
    Chunk {
        /// File to chunk
        #[arg(required = true)]
        file: PathBuf,

        /// Output directory (default from config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Maximum number of chunks; the last chunk absorbs the remainder
        #[arg(short, long)]
        max_chunks: Option<usize>,

        /// Initial target chunk size in bytes
        #[arg(short = 's', long)]
        initial_size: Option<usize>,
    },

    /// Search a file with a regex
    Grep {
        /// File to search
        #[arg(required = true)]
        file: PathBuf,

        /// Search pattern (regex)
        #[arg(required = true)]
        pattern: String,

        /// Maximum results to return
        #[arg(short, long, default_value = "20")]
        max_results: usize,

        /// Print matches as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the bytes in [start, end) of a file
    Peek {
        /// File to read
        #[arg(required = true)]
        file: PathBuf,

        /// Start offset in bytes
        start: usize,

        /// End offset in bytes (exclusive)
        end: usize,
    },
}
