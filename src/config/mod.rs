//! Configuration management
//!
//! One serde struct per concern, persisted as TOML under the user config
//! directory. Loading applies environment overrides and then validates the
//! whole tree, accumulating every violation rather than stopping at the
//! first.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::chunking::ChunkingConfig;
use crate::embedding::EmbeddingConfig;
use crate::error::{LoreError, Result};
use crate::feedback::FeedbackConfig;
use crate::providers::{default_provider_entries, ProviderEntryConfig};
use crate::retrieval::RetrievalConfig;
use crate::synthesis::SynthesisConfig;

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub synthesis: SynthesisConfig,
    pub feedback: FeedbackConfig,
    /// Generative fallback chain, tried in listed order
    #[serde(default = "default_provider_entries")]
    pub providers: Vec<ProviderEntryConfig>,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.local/share/lore"),
            },
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            synthesis: SynthesisConfig::default(),
            feedback: FeedbackConfig::default(),
            providers: default_provider_entries(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LoreError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| LoreError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| LoreError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Default configuration file location
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| LoreError::Config("Cannot determine config directory".to_string()))?;
        Ok(config_dir.join("lore").join("config.toml"))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(data_dir) = std::env::var("LORE_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(data_dir);
        }
    }

    /// Expand a leading `~/` in the configured data directory.
    pub fn expanded_data_dir(&self) -> Result<PathBuf> {
        expand_path(&self.storage.data_dir)
    }
}

/// Expand `~/` against the user's home directory.
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| LoreError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| LoreError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::default();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.chunking.chunk_size, config.chunking.chunk_size);
        assert_eq!(loaded.retrieval.top_k, config.retrieval.top_k);
        assert_eq!(loaded.providers.len(), config.providers.len());
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = Config::load(Path::new("/nonexistent/lore.toml")).unwrap_err();
        assert!(matches!(err, LoreError::ConfigNotFound { .. }));
    }

    #[test]
    fn test_expand_home_path() {
        let expanded = expand_path(Path::new("~/data")).unwrap();
        assert!(!expanded.starts_with("~"));

        let absolute = expand_path(Path::new("/tmp/data")).unwrap();
        assert_eq!(absolute, PathBuf::from("/tmp/data"));
    }
}
