//! Configuration management for contextbuddy
//!
//! Provides TOML-based configuration with defaults and validation.
//! Location: ~/.contextbuddy/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::context::Budgets;
use crate::errors::{EngineError, Result};
use crate::index::DEFAULT_EMBEDDING_MODEL;
use crate::models::{DEFAULT_MODEL, DEFAULT_OLLAMA_URL};
use crate::rag::EngineSettings;

/// Complete configuration for contextbuddy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub budgets: BudgetsConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
}

/// Retrieval and cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
    pub index_timeout_ms: u64,
}

/// Prompt size limits, in characters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetsConfig {
    pub snippet_chars: usize,
    pub message_chars: usize,
    pub history_turns: usize,
    pub total_chars: usize,
}

/// Ollama connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub base_url: String,
    pub name: String,
    pub max_input_chars: usize,
    pub max_output_tokens: usize,
    pub timeout_ms: u64,
}

/// Vector index configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub url: String,
    pub collection: String,
    pub embedding_model: String,
}

/// Conversation storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    pub storage_dir: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            cache_ttl_secs: 300,
            cache_capacity: 50,
            index_timeout_ms: 5000,
        }
    }
}

impl Default for BudgetsConfig {
    fn default() -> Self {
        let budgets = Budgets::default();
        Self {
            snippet_chars: budgets.snippet_chars,
            message_chars: budgets.message_chars,
            history_turns: budgets.history_turns,
            total_chars: budgets.total_chars,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            name: DEFAULT_MODEL.to_string(),
            max_input_chars: 8000,
            max_output_tokens: 2000,
            timeout_ms: 60_000,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: crate::index::qdrant::DEFAULT_QDRANT_URL.to_string(),
            collection: crate::index::qdrant::DEFAULT_COLLECTION.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            storage_dir: "~/.contextbuddy/sessions".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from an explicit file, or from the standard
    /// location (written with defaults on first run)
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            Self::load_from_file(&config_path)
        } else {
            Self::load_default()
        }
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from ~/.contextbuddy/config.toml, creating it if missing
    pub fn load_default() -> Result<Self> {
        let Some(config_path) = Self::default_path() else {
            return Ok(Config::default());
        };

        if config_path.exists() {
            return Self::load_from_file(&config_path);
        }

        let config = Config::default();
        config.save(&config_path)?;
        Ok(config)
    }

    /// Standard configuration file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".contextbuddy").join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.retrieval.top_k == 0 {
            return Err(EngineError::Config(
                "retrieval.top_k must be greater than 0".to_string(),
            ));
        }

        if self.budgets.total_chars == 0 {
            return Err(EngineError::Config(
                "budgets.total_chars must be greater than 0".to_string(),
            ));
        }

        if self.retrieval.index_timeout_ms == 0 || self.model.timeout_ms == 0 {
            return Err(EngineError::Config(
                "timeouts must be greater than 0".to_string(),
            ));
        }

        if self.model.max_output_tokens == 0 {
            return Err(EngineError::Config(
                "model.max_output_tokens must be greater than 0".to_string(),
            ));
        }

        if self.model.name.trim().is_empty() {
            return Err(EngineError::Config("model.name must not be empty".to_string()));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EngineError::Config(format!("Failed to create config dir: {}", e)))?;
        }

        std::fs::write(path, contents)
            .map_err(|e| EngineError::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Assembly budgets from the `[budgets]` section
    pub fn budgets(&self) -> Budgets {
        Budgets {
            snippet_chars: self.budgets.snippet_chars,
            message_chars: self.budgets.message_chars,
            history_turns: self.budgets.history_turns,
            total_chars: self.budgets.total_chars,
        }
    }

    /// Engine defaults derived from this configuration
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            top_k: self.retrieval.top_k,
            budgets: self.budgets(),
            cache_capacity: self.retrieval.cache_capacity,
            cache_ttl: Duration::from_secs(self.retrieval.cache_ttl_secs),
            index_timeout: Duration::from_millis(self.retrieval.index_timeout_ms),
            model_timeout: Duration::from_millis(self.model.timeout_ms),
            max_output: self.model.max_output_tokens,
        }
    }

    /// Model request timeout
    pub fn model_timeout(&self) -> Duration {
        Duration::from_millis(self.model.timeout_ms)
    }

    /// Expand tilde in paths
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    /// Get session storage directory
    pub fn sessions_dir(&self) -> PathBuf {
        Self::expand_path(&self.sessions.storage_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.cache_ttl_secs, 300);
        assert_eq!(config.budgets.total_chars, 3000);
        assert_eq!(config.model.name, "qwen2.5:7b-instruct");
    }

    #[test]
    fn test_config_validation_success() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_top_k() {
        let mut config = Config::default();
        config.retrieval.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_budget() {
        let mut config = Config::default();
        config.budgets.total_chars = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_timeout() {
        let mut config = Config::default();
        config.model.timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("[retrieval]\ntop_k = 8\n").unwrap();
        assert_eq!(config.retrieval.top_k, 8);
        assert_eq!(config.retrieval.cache_capacity, 50);
        assert_eq!(config.budgets, BudgetsConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.budgets.history_turns = 4;
        config.save(&path).unwrap();

        let loaded = Config::load(Some(path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[budgets]\ntotal_chars = 0\n").unwrap();

        assert!(matches!(Config::load(Some(path)), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_engine_settings() {
        let settings = Config::default().engine_settings();
        assert_eq!(settings.top_k, 5);
        assert_eq!(settings.cache_ttl, Duration::from_secs(300));
        assert_eq!(settings.index_timeout, Duration::from_millis(5000));
        assert_eq!(settings.budgets, Budgets::default());
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let expanded = Config::expand_path("~/.contextbuddy");
        assert!(!expanded.to_string_lossy().contains('~'));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let expanded = Config::expand_path("/absolute/path");
        assert_eq!(expanded.to_string_lossy(), "/absolute/path");
    }
}
