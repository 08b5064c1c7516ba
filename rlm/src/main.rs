//! rlm - recursive-context processing engine
//!
//! CLI entry point. Every command is one process: load the session from the
//! state file, apply the command, write the state back.

use std::io::Read;
use std::path::Path;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, info};

use rlm::cli::{Cli, Command, OutputFormat};
use rlm::config::Config;
use rlm::exec::{self, ExecEnv};
use rlm::{Session, WaveScheduler, bridge_from_config};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Priority: CLI --log-level > config file > default (WARN); stdout stays clean for command output
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to WARN", s);
                tracing::Level::WARN
            }
        },
        None => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    debug!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    let state_path = cli.state.clone().unwrap_or_else(|| config.state_path.clone());

    // History entries are keyed by subcommand name
    let name = cli.command.name();
    debug!(command = ?cli.command, ?state_path, "main: dispatching command");
    match cli.command {
        Command::Init { context, max_bytes } => cmd_init(name, &config, &state_path, &context, max_bytes),
        Command::Exec { code, max_output_chars } => cmd_exec(name, &config, &state_path, code, max_output_chars).await,
        Command::Status { format } => cmd_status(&state_path, format),
        Command::Reset => cmd_reset(&state_path),
        Command::Chunk {
            max_chunks,
            target_size,
        } => cmd_chunk(name, &state_path, max_chunks, target_size),
        Command::Process {
            query,
            max_concurrent,
            format,
        } => cmd_process(name, &config, &state_path, &query, max_concurrent, format).await,
        Command::ExportBuffers { out } => cmd_export_buffers(&state_path, &out),
        Command::Stats { format } => cmd_stats(&state_path, format),
    }
}

fn cmd_init(name: &str, config: &Config, state_path: &Path, context: &Path, max_bytes: Option<usize>) -> Result<()> {
    debug!(?context, ?max_bytes, "cmd_init: called");
    let mut session = Session::init(context, state_path, &config.chunker, max_bytes)?;
    session.record_history(name, true);
    session.save()?;

    let status = session.status();
    println!(
        "{} Session {} started",
        "✓".green(),
        status.session_id.cyan()
    );
    println!("Corpus: {} ({} bytes)", status.corpus_path.display(), status.corpus_len);
    println!("State:  {}", state_path.display());
    Ok(())
}

async fn cmd_exec(
    name: &str,
    config: &Config,
    state_path: &Path,
    code: Option<String>,
    max_output_chars: usize,
) -> Result<()> {
    debug!(has_code = code.is_some(), max_output_chars, "cmd_exec: called");
    let code = match code {
        Some(code) => code,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read code from stdin")?;
            buf
        }
    };

    let mut session = Session::open(state_path)?;
    let env = ExecEnv {
        bridge: bridge_from_config(&config.subcall),
        timeout: config.subcall.timeout(),
        max_payload_chars: config.scheduler.max_payload_chars,
        max_output_chars,
    };

    let outcome = match exec::execute(&mut session, &code, &env).await {
        Ok(outcome) => outcome,
        Err(e) => {
            session.record_history(name, false);
            session.save()?;
            return Err(e.into());
        }
    };

    print!("{}", outcome.output);
    session.record_history(name, outcome.error.is_none());
    session.save()?;
    info!(completed = outcome.completed, mutated = outcome.mutated, "exec finished");

    match outcome.error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn cmd_status(state_path: &Path, format: OutputFormat) -> Result<()> {
    debug!(?format, "cmd_status: called");
    let session = Session::open(state_path)?;
    let status = session.status();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        OutputFormat::Text => {
            println!("{}", "RLM Session".bold());
            println!("-----------");
            println!("Session:     {}", status.session_id);
            println!("Created:     {}", status.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
            println!("Corpus:      {}", status.corpus_path.display());
            println!("Corpus size: {} bytes", status.corpus_len);
            match status.chunk_count {
                Some(n) => println!("Chunks:      {}", n),
                None => println!("Chunks:      {}", "none (run chunk)".dimmed()),
            }
            println!("Buffers:     {}", status.buffer_count);
            println!("Results:     {}", status.result_count);
            println!("Commands:    {}", status.command_count);
            println!("Target size: {} bytes", status.target_size);
        }
    }
    Ok(())
}

fn cmd_reset(state_path: &Path) -> Result<()> {
    debug!("cmd_reset: called");
    if Session::reset(state_path)? {
        println!("{} Session reset", "✓".green());
    } else {
        println!("No session to reset");
    }
    Ok(())
}

fn cmd_chunk(name: &str, state_path: &Path, max_chunks: Option<usize>, target_size: Option<usize>) -> Result<()> {
    debug!(?max_chunks, ?target_size, "cmd_chunk: called");
    let mut session = Session::open(state_path)?;

    let (count, content_type) = match session.chunk(max_chunks, target_size) {
        Ok(chunks) => (chunks.len(), chunks.first().map(|c| c.detected_type)),
        Err(e) => {
            session.record_history(name, false);
            session.save()?;
            return Err(e.into());
        }
    };
    session.record_history(name, true);
    session.save()?;

    if let Some(content_type) = content_type {
        println!("Content Type: {}", content_type.display_name());
    }
    println!(
        "{} Created {} chunks (target {} bytes)",
        "✓".green(),
        count,
        target_size.unwrap_or(session.status().target_size)
    );
    Ok(())
}

async fn cmd_process(
    name: &str,
    config: &Config,
    state_path: &Path,
    query: &str,
    max_concurrent: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    debug!(%query, ?max_concurrent, ?format, "cmd_process: called");
    let mut session = Session::open(state_path)?;

    let mut scheduler_config = config.scheduler.clone();
    if let Some(n) = max_concurrent {
        scheduler_config.max_concurrent = n;
    }
    let scheduler = WaveScheduler::new(scheduler_config, bridge_from_config(&config.subcall), config.subcall.timeout())?;

    let result = session.process(query, &scheduler).await;
    session.record_history(name, result.is_ok());
    session.save()?;
    let summary = result?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Text => {
            println!(
                "Waves: {}/{}{}",
                summary.processed_waves,
                summary.total_waves,
                if summary.early_stop {
                    " (stopped early)".yellow().to_string()
                } else {
                    String::new()
                }
            );
            println!(
                "Chunks: {}/{} processed, {} succeeded, {} failed",
                summary.processed_chunks,
                summary.total_chunks,
                summary.successful_chunks.to_string().green(),
                summary.failed_chunks.to_string().red()
            );
            for result in &summary.results {
                match (&result.payload, &result.error) {
                    (Some(payload), _) if result.success => {
                        let confidence = result
                            .confidence
                            .map(|c| format!(" [{:.2}]", c))
                            .unwrap_or_default();
                        println!("{}{} {}", format!("#{}", result.chunk_id).cyan(), confidence, payload);
                    }
                    (_, Some(error)) => {
                        println!("{} {}", format!("#{}", result.chunk_id).cyan(), format!("error: {}", error).red());
                    }
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

fn cmd_export_buffers(state_path: &Path, out: &Path) -> Result<()> {
    debug!(?out, "cmd_export_buffers: called");
    let session = Session::open(state_path)?;
    let count = session
        .export_buffers(out)
        .context(format!("Failed to export buffers to {}", out.display()))?;
    println!("{} Exported {} buffers to {}", "✓".green(), count, out.display());
    Ok(())
}

fn cmd_stats(state_path: &Path, format: OutputFormat) -> Result<()> {
    debug!(?format, "cmd_stats: called");
    let session = Session::open(state_path)?;
    let stats = session.controller_stats();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        OutputFormat::Text => {
            println!("{}", "Chunk Size Controller".bold());
            println!("---------------------");
            println!("Current size:    {} bytes", stats.current_size);
            println!("Bounds:          {} - {} bytes", stats.min_size, stats.max_size);
            println!("Optimal time:    {} ms", stats.optimal_time_ms);
            println!("Chunks recorded: {}", stats.adjustments_made);
            println!("Avg time:        {:.1} ms", stats.avg_processing_time_ms);
            println!("Out of band:     {}", stats.size_adjustments);
        }
    }
    Ok(())
}
