
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::embeddings::DEFAULT_FALLBACK_DIMENSION;
use crate::embeddings::chunking::ChunkingConfig;
use crate::ingest::FailurePolicy;

/// Embedding service location used when the config file does not set one
pub const DEFAULT_EMBEDDING_URL: &str = "http://localhost:8000";
pub const DEFAULT_RAG_TOP_K: u32 = 5;
pub const DEFAULT_COLLECTION: &str = "knowledge";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    /// Sent to the service as `max_length`
    pub max_length: u32,
    pub timeout_seconds: u64,
    /// Total requests per embedding, the first one included
    #[serde(alias = "retry_attempts")]
    pub max_attempts: u32,
    /// Width of fallback vectors when no run width has been established
    pub fallback_dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_EMBEDDING_URL.to_string(),
            max_length: 1024,
            timeout_seconds: 30,
            max_attempts: 2,
            fallback_dimension: DEFAULT_FALLBACK_DIMENSION,
        }
    }
}

/// Retrieval settings. Ingestion only carries and validates these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RagConfig {
    /// Number of chunks fetched per retrieval query
    pub top_k: u32,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_RAG_TOP_K,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IngestionConfig {
    pub failure_policy: FailurePolicy,
    /// 1 processes chunks strictly one after another
    pub max_concurrent_chunks: usize,
    pub store_timeout_seconds: u64,
    pub default_collection: String,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            max_concurrent_chunks: 1,
            store_timeout_seconds: 30,
            default_collection: DEFAULT_COLLECTION.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid embedding max length: {0} (must be between 1 and 32768)")]
    InvalidMaxLength(u32),
    #[error("Invalid embedding timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid max attempts: {0} (must be between 1 and 10)")]
    InvalidMaxAttempts(u32),
    #[error("Invalid fallback dimension: {0} (must be between 1 and 8192)")]
    InvalidFallbackDimension(usize),
    #[error("Invalid max words per chunk: {0} (must be between 1 and 10000)")]
    InvalidMaxWords(usize),
    #[error("Invalid top-k: {0} (must be between 1 and 100)")]
    InvalidTopK(u32),
    #[error("Invalid chunk concurrency: {0} (must be between 1 and 32)")]
    InvalidConcurrency(usize),
    #[error("Invalid store timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidStoreTimeout(u64),
    #[error("Invalid collection name: '{0}' (letters, digits, '_' and '-' only)")]
    InvalidCollection(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default configuration directory, `~/.rag-ingest`
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".rag-ingest"))
            .or_else(|| dirs::data_dir().map(|data| data.join("rag-ingest")))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedding.validate()?;

        if !(1..=10_000).contains(&self.chunking.max_words) {
            return Err(ConfigError::InvalidMaxWords(self.chunking.max_words));
        }

        if !(1..=100).contains(&self.rag.top_k) {
            return Err(ConfigError::InvalidTopK(self.rag.top_k));
        }

        self.ingestion.validate()
    }

    /// Retrieval fan-out: how many chunks a query fetches
    #[inline]
    pub fn rag_top_k(&self) -> u32 {
        self.rag.top_k
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Get the path for the SQLite metadata database
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.get_base_dir().join("metadata.db")
    }

    /// Get the path for the LanceDB vector database directory
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.get_base_dir().join("vectors")
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.service_url()?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(self.base_url.clone()));
        }

        if !(1..=32_768).contains(&self.max_length) {
            return Err(ConfigError::InvalidMaxLength(self.max_length));
        }

        if !(1..=600).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        if !(1..=10).contains(&self.max_attempts) {
            return Err(ConfigError::InvalidMaxAttempts(self.max_attempts));
        }

        if !(1..=8192).contains(&self.fallback_dimension) {
            return Err(ConfigError::InvalidFallbackDimension(
                self.fallback_dimension,
            ));
        }

        Ok(())
    }

    pub fn service_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.base_url).map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl IngestionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=32).contains(&self.max_concurrent_chunks) {
            return Err(ConfigError::InvalidConcurrency(self.max_concurrent_chunks));
        }

        if !(1..=600).contains(&self.store_timeout_seconds) {
            return Err(ConfigError::InvalidStoreTimeout(self.store_timeout_seconds));
        }

        validate_collection_name(&self.default_collection)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_seconds)
    }
}

/// Collection names become LanceDB table names and filter literals
#[inline]
pub fn validate_collection_name(name: &str) -> Result<(), ConfigError> {
    let valid = !name.is_empty()
        && name.len() <= 128
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidCollection(name.to_string()))
    }
}
