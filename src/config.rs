use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default tracing directive, applied on top of `RUST_LOG`
    pub log_level: String,
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "review_service=info".to_string(),
            storage: StorageConfig::default(),
        }
    }
}

/// Which backend holds reviews and reservation events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Json,
    Postgres,
    Memory,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory for the JSON backend
    pub json_path: PathBuf,
    /// Connection string for the Postgres backend; `DATABASE_URL` takes precedence
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Json,
            json_path: PathBuf::from(".review-service/data"),
            database_url: None,
            max_connections: 5,
        }
    }
}

impl StorageConfig {
    /// Resolve the Postgres connection string from the environment or the file
    pub fn database_url(&self) -> Result<String> {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            return Ok(url);
        }

        self.database_url
            .clone()
            .context("Postgres backend needs DATABASE_URL or storage.database_url")
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        info!(path = %path.display(), "Loaded configuration");

        Ok(config)
    }
}
