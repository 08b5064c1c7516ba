use std::fs;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;

use corpusstore::cli::{Cli, Command};
use corpusstore::config::Config;
use corpusstore::{Corpus, chunk_content, chunker::detect_content_type};

fn setup_logging() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("corpusstore starting");

    match cli.command {
        Command::Detect { file } => {
            let corpus = Corpus::load(&file)?;
            let content_type = detect_content_type(corpus.content());
            println!("Content Type: {}", content_type.display_name().cyan());
            println!("Enum: {}", content_type);
        }
        Command::Chunk {
            file,
            output,
            max_chunks,
            initial_size,
        } => {
            let corpus = Corpus::load(&file)?;
            let target = initial_size
                .unwrap_or(config.chunker.initial_size)
                .clamp(config.chunker.min_size, config.chunker.max_size);
            let chunks = chunk_content(corpus.content(), target, max_chunks)?;

            let out_dir = output.unwrap_or(config.output_dir);
            fs::create_dir_all(&out_dir).context(format!("Failed to create {}", out_dir.display()))?;
            for chunk in &chunks {
                let path = out_dir.join(format!("chunk_{:03}.txt", chunk.id));
                fs::write(&path, corpus.peek(chunk.start, chunk.end)?)?;
            }

            println!("Chunking: {}", file.display());
            if let Some(first) = chunks.first() {
                println!("Content Type: {}", first.detected_type.display_name());
            }
            println!("Chunk Size: {} bytes", target);
            println!("{} Created {} chunks in {}", "✓".green(), chunks.len(), out_dir.display().to_string().cyan());
        }
        Command::Grep {
            file,
            pattern,
            max_results,
            json,
        } => {
            let corpus = Corpus::load(&file)?;
            let matches = corpus.grep_limited(&pattern, max_results)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&matches)?);
                return Ok(());
            }
            if matches.is_empty() {
                println!("No matches found");
            }
            for m in matches {
                println!(
                    "{}:{} {}",
                    m.line.to_string().yellow(),
                    format!("{}-{}", m.offset_start, m.offset_end).dimmed(),
                    m.text
                );
            }
        }
        Command::Peek { file, start, end } => {
            let corpus = Corpus::load(&file)?;
            println!("{}", corpus.peek(start, end)?);
        }
    }

    Ok(())
}
