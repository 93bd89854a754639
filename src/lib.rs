use thiserror::Error;

use crate::ingest::{ChunkError, IngestedPoint};

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Document '{document}' contains no usable text")]
    EmptyDocument { document: String },

    #[error("Failed to extract text from '{document}': {message}")]
    Extraction { document: String, message: String },

    #[error("Failed to provision collection '{collection}': {message}")]
    CollectionProvisionFailed { collection: String, message: String },

    /// Raised only under the abort failure policy. `completed` holds the
    /// points written before the failing chunk.
    #[error("Ingestion of '{document}' aborted at chunk {ordinal}: {source}")]
    ChunkFailed {
        document: String,
        ordinal: usize,
        #[source]
        source: ChunkError,
        completed: Vec<IngestedPoint>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod extractor;
pub mod ingest;
