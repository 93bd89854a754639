// Embeddings module
// Chunking of normalized text and embedding generation with a degraded fallback


pub mod chunking;
pub mod client;

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

pub use chunking::{
    ChunkingConfig, ContentChunk, WordChunks, chunk_content, chunk_words, expected_chunk_count,
    word_count,
};
pub use client::HttpEmbeddingClient;

/// Width used for fallback vectors before a run has established its own width
pub const DEFAULT_FALLBACK_DIMENSION: usize = 384;

/// A source of embedding vectors for text.
///
/// Implementations may block; [`Embedder`] runs them on the blocking pool.
pub trait EmbeddingService: Send + Sync {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

/// Result of embedding one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    /// Why the service result was replaced by a fallback vector, if it was
    pub degraded: Option<String>,
}

impl Embedding {
    #[inline]
    pub fn width(&self) -> usize {
        self.vector.len()
    }

    #[inline]
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

/// Wraps an [`EmbeddingService`] so that embedding never fails.
///
/// Any service failure, timeout, or empty result is replaced with a
/// uniformly random vector of the requested fallback width.
///
/// A timed-out call is not cancelled: the blocking task keeps running until
/// the service returns. Give [`HttpEmbeddingClient`] a deadline no longer
/// than the embedder timeout so it stops retrying once the fallback is used.
#[derive(Clone)]
pub struct Embedder {
    service: Arc<dyn EmbeddingService>,
    timeout: Duration,
}

impl Embedder {
    #[inline]
    pub fn new(service: Arc<dyn EmbeddingService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    /// Embed `text`, degrading to a `fallback_width` pseudo-vector on failure
    #[inline]
    pub async fn embed(&self, text: &str, fallback_width: usize) -> Embedding {
        let service = Arc::clone(&self.service);
        let owned_text = text.to_owned();
        let task = tokio::task::spawn_blocking(move || service.embed(&owned_text));

        let failure = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(Ok(vector))) if !vector.is_empty() => {
                debug!("Computed embedding with {} dimensions", vector.len());
                return Embedding {
                    vector,
                    degraded: None,
                };
            }
            Ok(Ok(Ok(_))) => "embedding service returned an empty vector".to_string(),
            Ok(Ok(Err(e))) => format!("{:#}", e),
            Ok(Err(join_error)) => format!("embedding task failed: {}", join_error),
            Err(_) => format!("embedding timed out after {:?}", self.timeout),
        };

        warn!(
            "Embedding degraded to {}-dimensional fallback vector: {}",
            fallback_width.max(1),
            failure
        );

        Embedding {
            vector: fallback_vector(fallback_width),
            degraded: Some(failure),
        }
    }
}

/// Pseudo-vector with components drawn uniformly from `[0, 1)`
#[inline]
pub fn fallback_vector(width: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..width.max(1)).map(|_| rng.r#gen::<f32>()).collect()
}
