//! Configuration management for stepforge

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::core::optimizer::{OptimizerConfig, TextOptimizer};
use crate::core::pipeline::Settings;
use crate::core::planner::{PlanLimits, StepPlanner};
use crate::core::relevance::{RelevanceScorer, ScoringConfig};
use crate::core::tokenizer::TokenizerChain;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub planner: PlanLimits,
    pub tokenizer: TokenizerConfig,
    pub optimizer: OptimizerConfig,
    pub scoring: ScoringConfig,
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    /// Providers tried in order: `cl100k_base`, `o200k_base`, `words`
    pub providers: Vec<String>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            providers: vec!["cl100k_base".to_string(), "words".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub timeout_secs: u64,
    pub max_file_size_mb: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_file_size_mb: 10,
        }
    }
}

impl Config {
    /// Reject settings the planner can't work with
    pub fn validate(&self) -> Result<()> {
        if self.planner.max_tokens_per_step == 0 {
            bail!("planner.max_tokens_per_step must be greater than zero");
        }
        if self.planner.max_token_limit == 0 {
            bail!("planner.max_token_limit must be greater than zero");
        }
        if self.tokenizer.providers.is_empty() {
            bail!("tokenizer.providers must name at least one provider");
        }
        if self.extraction.timeout_secs == 0 {
            bail!("extraction.timeout_secs must be greater than zero");
        }
        if self.planner.max_tokens_per_step > self.planner.max_token_limit {
            tracing::warn!(
                "max_tokens_per_step ({}) exceeds max_token_limit ({})",
                self.planner.max_tokens_per_step,
                self.planner.max_token_limit
            );
        }
        Ok(())
    }

    pub fn tokenizer_chain(&self) -> Result<TokenizerChain> {
        TokenizerChain::from_names(&self.tokenizer.providers).context("Invalid tokenizer configuration")
    }

    /// Build the runtime settings used by the pipeline
    pub fn settings(&self) -> Result<Settings> {
        self.validate()?;
        let tokenizer = self.tokenizer_chain()?;

        Ok(Settings {
            planner: StepPlanner::new(
                self.planner,
                tokenizer,
                TextOptimizer::new(self.optimizer.clone()),
            ),
            scorer: RelevanceScorer::new(self.scoring.clone()),
            extraction_timeout: Duration::from_secs(self.extraction.timeout_secs),
            max_file_size: u64::from(self.extraction.max_file_size_mb) * 1024 * 1024,
        })
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let config_dir = directories::ProjectDirs::from("com", "stepforge", "stepforge")
        .context("Failed to determine config directory")?
        .config_dir()
        .to_path_buf();

    Ok(config_dir.join("config.toml"))
}

/// Load configuration from file or use defaults
pub fn load_config(custom_path: Option<&str>) -> Result<Config> {
    let path = if let Some(p) = custom_path {
        PathBuf::from(p)
    } else {
        config_path()?
    };

    let config = if path.exists() {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {:?}", path))?
    } else {
        Config::default()
    };

    config.validate()?;
    Ok(config)
}

/// Initialize configuration file with defaults
pub fn init_config(custom_path: Option<&str>) -> Result<()> {
    let path = match custom_path {
        Some(p) => PathBuf::from(p),
        None => config_path()?,
    };

    if path.exists() {
        println!("Configuration file already exists at {:?}", path);
        return Ok(());
    }

    // Create directory if needed
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {:?}", parent))?;
    }

    // Write default config
    let default_config = Config::default();
    let content = toml::to_string_pretty(&default_config)
        .context("Failed to serialize default config")?;

    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write config to {:?}", path))?;

    println!("Configuration initialized at {:?}", path);
    Ok(())
}

/// Show current configuration
pub fn show_config(config: &Config) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .context("Failed to serialize config")?;
    println!("{}", content);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.planner.max_tokens_per_step, 500);
        assert_eq!(config.planner.max_token_limit, 2500);
        assert!(config.settings().is_ok());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config::default();
        let content = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&content).unwrap();
        assert_eq!(parsed.planner, config.planner);
        assert_eq!(parsed.tokenizer.providers, config.tokenizer.providers);
        assert_eq!(parsed.scoring.weights.definition, 5.0);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let parsed: Config = toml::from_str("[planner]\nmax_tokens_per_step = 100\nmax_token_limit = 400\n").unwrap();
        assert_eq!(parsed.planner.max_tokens_per_step, 100);
        assert_eq!(parsed.extraction.timeout_secs, 30);
        assert!(parsed.optimizer.remove_stopwords);
    }

    #[test]
    fn test_zero_limits_rejected() {
        let mut config = Config::default();
        config.planner.max_tokens_per_step = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.planner.max_token_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_tokenizer_rejected() {
        let mut config = Config::default();
        config.tokenizer.providers = vec!["nope".to_string()];
        assert!(config.settings().is_err());
    }

    #[test]
    fn test_load_from_custom_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("custom.toml");
        std::fs::write(&path, "[tokenizer]\nproviders = [\"words\"]\n").unwrap();

        let config = load_config(path.to_str()).unwrap();
        assert_eq!(config.tokenizer.providers, vec!["words".to_string()]);

        let missing = temp_dir.path().join("missing.toml");
        let config = load_config(missing.to_str()).unwrap();
        assert_eq!(config.planner, PlanLimits::default());
    }
}
