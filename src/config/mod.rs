// Configuration management module
// TOML-backed settings for the embedding service, chunking, retrieval and ingestion

pub mod settings;

pub use settings::{
    Config, ConfigError, EmbeddingConfig, IngestionConfig, RagConfig, validate_collection_name,
};
