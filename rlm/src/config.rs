//! rlm configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use corpusstore::ChunkerConfig;

use crate::bridge::SubcallConfig;
use crate::scheduler::SchedulerConfig;

/// Environment variable that switches sub-calls off
pub const ENV_DISABLED: &str = "RLM_DISABLED";

/// Environment variable naming the delegate executable
pub const ENV_CLI_PATH: &str = "RLM_CLI_PATH";

/// Environment variable naming the delegate agent
pub const ENV_AGENT: &str = "RLM_AGENT";

/// Environment variable holding the sub-call timeout in seconds
pub const ENV_TIMEOUT: &str = "RLM_TIMEOUT";

/// Older spelling accepted for every `RLM_*` variable
const LEGACY_ENV_PREFIX: &str = "OPENCODE_";

/// Main rlm configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the session state lives
    #[serde(rename = "state-path")]
    pub state_path: PathBuf,

    /// Log level used when none is given on the command line
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Adaptive chunker bounds
    pub chunker: ChunkerConfig,

    /// Wave scheduler settings
    pub scheduler: SchedulerConfig,

    /// Delegate invocation
    pub subcall: SubcallConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from(".rlm").join("state.json"),
            log_level: None,
            chunker: ChunkerConfig::default(),
            scheduler: SchedulerConfig::default(),
            subcall: SubcallConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        self.chunker.validate()?;
        self.scheduler.validate().map_err(|e| eyre::eyre!(e))?;
        if self.subcall.timeout_secs == 0 {
            return Err(eyre::eyre!("subcall.timeout-secs must be > 0"));
        }
        if self.subcall.cli_path.trim().is_empty() {
            return Err(eyre::eyre!("subcall.cli-path must not be empty"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain, then apply environment overrides
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::load_file_chain(config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read just the log level, before logging is initialised
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load_file_chain(config_path).ok().and_then(|c| c.log_level)
    }

    fn load_file_chain(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .rlm.yml
        let local_config = PathBuf::from(".rlm.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/rlm/rlm.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("rlm").join("rlm.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::debug!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Apply `RLM_*` overrides read through `lookup`; `OPENCODE_RLM_*` is the fallback
    pub fn apply_env_overrides<F>(&mut self, env: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).or_else(|| env(&format!("{}{}", LEGACY_ENV_PREFIX, key)));

        if let Some(value) = lookup(ENV_DISABLED) {
            self.subcall.disabled = matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(value) = lookup(ENV_CLI_PATH)
            && !value.trim().is_empty()
        {
            self.subcall.cli_path = value;
        }
        if let Some(value) = lookup(ENV_AGENT)
            && !value.trim().is_empty()
        {
            self.subcall.agent = value;
        }
        if let Some(value) = lookup(ENV_TIMEOUT) {
            self.subcall.timeout_secs = value
                .trim()
                .parse()
                .context(format!("{} must be a whole number of seconds, got '{}'", ENV_TIMEOUT, value))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert_eq!(config.state_path, PathBuf::from(".rlm/state.json"));
        assert_eq!(config.subcall.agent, "rlm-subcall");
        assert_eq!(config.subcall.timeout_secs, 120);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_explicit_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rlm.yml");
        fs::write(
            &path,
            "state-path: /tmp/s.json\nlog-level: debug\nscheduler:\n  max-concurrent: 2\nsubcall:\n  cli-path: my-agent\n",
        )
        .unwrap();

        let config = Config::load_file_chain(Some(&path)).unwrap();
        assert_eq!(config.state_path, PathBuf::from("/tmp/s.json"));
        assert_eq!(config.scheduler.max_concurrent, 2);
        assert_eq!(config.scheduler.min_confident_results, 3);
        assert_eq!(config.subcall.cli_path, "my-agent");
        assert_eq!(Config::load_log_level(Some(&path)).as_deref(), Some("debug"));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let temp = TempDir::new().unwrap();
        assert!(Config::load(Some(&temp.path().join("nope.yml"))).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env_overrides(lookup(&[
                (ENV_DISABLED, "1"),
                (ENV_CLI_PATH, "/opt/agent"),
                (ENV_AGENT, "reader"),
                (ENV_TIMEOUT, "30"),
            ]))
            .unwrap();

        assert!(config.subcall.disabled);
        assert_eq!(config.subcall.cli_path, "/opt/agent");
        assert_eq!(config.subcall.agent, "reader");
        assert_eq!(config.subcall.timeout_secs, 30);
    }

    #[test]
    fn test_env_disabled_false_values() {
        let mut config = Config::default();
        config.subcall.disabled = true;
        config.apply_env_overrides(lookup(&[(ENV_DISABLED, "0")])).unwrap();
        assert!(!config.subcall.disabled);
    }

    #[test]
    fn test_env_legacy_names() {
        let mut config = Config::default();
        config
            .apply_env_overrides(lookup(&[("OPENCODE_RLM_AGENT", "old-agent"), ("OPENCODE_RLM_TIMEOUT", "5")]))
            .unwrap();
        assert_eq!(config.subcall.agent, "old-agent");
        assert_eq!(config.subcall.timeout_secs, 5);

        config
            .apply_env_overrides(lookup(&[(ENV_AGENT, "new-agent"), ("OPENCODE_RLM_AGENT", "old-agent")]))
            .unwrap();
        assert_eq!(config.subcall.agent, "new-agent");
    }

    #[test]
    fn test_env_bad_timeout() {
        let mut config = Config::default();
        let err = config
            .apply_env_overrides(lookup(&[(ENV_TIMEOUT, "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_TIMEOUT));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.subcall.timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
