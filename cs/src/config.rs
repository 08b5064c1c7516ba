//! Configuration for corpusstore

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Chunk sizing bounds for the adaptive chunker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Starting target chunk size in bytes
    #[serde(rename = "initial-size")]
    pub initial_size: usize,

    /// Lower bound for the target size
    #[serde(rename = "min-size")]
    pub min_size: usize,

    /// Upper bound for the target size
    #[serde(rename = "max-size")]
    pub max_size: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            initial_size: crate::DEFAULT_INITIAL_CHUNK_SIZE,
            min_size: crate::DEFAULT_MIN_CHUNK_SIZE,
            max_size: crate::DEFAULT_MAX_CHUNK_SIZE,
        }
    }
}

impl ChunkerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_size == 0 {
            return Err(eyre::eyre!("chunker.min-size must be > 0"));
        }
        if self.min_size > self.max_size {
            return Err(eyre::eyre!(
                "chunker.min-size ({}) exceeds chunker.max-size ({})",
                self.min_size,
                self.max_size
            ));
        }
        Ok(())
    }
}

/// Settings for the standalone `cs` tool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory chunk files are written to
    #[serde(rename = "output-dir")]
    pub output_dir: PathBuf,

    /// Chunk sizing
    pub chunker: ChunkerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(".rlm").join("chunks"),
            chunker: ChunkerConfig::default(),
        }
    }
}

impl Config {
    /// Load config from file, or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            return Self::load_from_file(config_path)
                .context(format!("Failed to load config from {}", config_path.display()));
        }

        // Try default locations
        let default_paths = [
            dirs::config_dir().map(|p| p.join("corpusstore").join("config.yml")),
            Some(PathBuf::from("corpusstore.yml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                return Self::load_from_file(path);
            }
        }

        Ok(Config::default())
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.chunker.validate()?;
        Ok(config)
    }
}
