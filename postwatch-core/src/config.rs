use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::ConfigError;

/// Which match-store backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    File,
    Database,
}

/// Application configuration. Paths and the database URL are explicit
/// and handed to the store constructors; nothing here is process-global.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
    /// Directory holding one match document per search (file backend).
    #[serde(default = "default_matches_dir")]
    pub matches_dir: PathBuf,
    /// SQLite URL (database backend).
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// JSON registry of saved searches.
    #[serde(default = "default_searches_file")]
    pub searches_file: PathBuf,
    /// Ingestion batch size for streamed dumps.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_backend() -> StorageBackend {
    StorageBackend::File
}

fn default_matches_dir() -> PathBuf {
    PathBuf::from("matches")
}

fn default_database_url() -> String {
    "sqlite://postwatch.db".to_string()
}

fn default_searches_file() -> PathBuf {
    PathBuf::from("config/searches.json")
}

fn default_batch_size() -> usize {
    100
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            matches_dir: default_matches_dir(),
            database_url: default_database_url(),
            searches_file: default_searches_file(),
            batch_size: default_batch_size(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let text = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "batch_size".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = AppConfig::default();
        assert_eq!(config.backend, StorageBackend::File);
        assert_eq!(config.batch_size, 100);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: AppConfig = toml::from_str("backend = \"database\"").unwrap();
        assert_eq!(config.backend, StorageBackend::Database);
        assert_eq!(config.matches_dir, PathBuf::from("matches"));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config: AppConfig = toml::from_str("batch_size = 0").unwrap();
        assert!(config.validate().is_err());
    }
}
