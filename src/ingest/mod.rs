// Ingestion module
// Turns an uploaded document into metadata rows and vector points, keeping the two stores in step

pub mod consistency;
pub mod point_id;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{Config, validate_collection_name};
use crate::database::{
    KnowledgeChunk, MetadataStore, PointPayload, UnitOfWork, VectorIndex, VectorPoint,
};
use crate::embeddings::chunking::{ChunkingConfig, ContentChunk, chunk_content};
use crate::embeddings::{
    DEFAULT_FALLBACK_DIMENSION, Embedder, Embedding, HttpEmbeddingClient, fallback_vector,
};
use crate::extractor::{DocumentFormat, ExtractError, extract_text, normalize_text};
use crate::{IngestError, Result};

pub use consistency::{
    ConsistencyReport, ConsistencyValidator, MissingPoint, ProvenanceMismatch,
};
pub use point_id::{PointIdAllocator, PointIdBlock};

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(30);

/// What to do with the rest of a run when one chunk fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Keep processing the remaining chunks and report every failure
    #[default]
    Continue,
    /// Stop at the first failed chunk and return the points written so far
    Abort,
}

impl fmt::Display for FailurePolicy {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            FailurePolicy::Continue => write!(f, "continue"),
            FailurePolicy::Abort => write!(f, "abort"),
        }
    }
}

/// Stages of one ingestion run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Extracting,
    Normalizing,
    Chunking,
    Probing,
    PerChunk,
    Done,
    Failed,
}

impl fmt::Display for RunStage {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            RunStage::Extracting => "Extracting",
            RunStage::Normalizing => "Normalizing",
            RunStage::Chunking => "Chunking",
            RunStage::Probing => "Probing",
            RunStage::PerChunk => "PerChunk",
            RunStage::Done => "Done",
            RunStage::Failed => "Failed",
        };
        write!(f, "{}", name)
    }
}

/// Failure of a single chunk. The ordinal addresses the chunk for a retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    #[error("metadata write for chunk {ordinal} failed: {message}")]
    MetadataWriteFailed { ordinal: usize, message: String },

    #[error("vector write for chunk {ordinal} failed: {message}")]
    VectorWriteFailed { ordinal: usize, message: String },

    #[error("chunk {ordinal} embedding has {actual} dimensions but the collection has {expected}")]
    DimensionMismatch {
        ordinal: usize,
        expected: usize,
        actual: usize,
    },

    #[error("{operation} for chunk {ordinal} timed out after {timeout:?}")]
    Timeout {
        ordinal: usize,
        operation: &'static str,
        timeout: Duration,
    },
}

impl ChunkError {
    #[inline]
    pub fn ordinal(&self) -> usize {
        match *self {
            ChunkError::MetadataWriteFailed { ordinal, .. }
            | ChunkError::VectorWriteFailed { ordinal, .. }
            | ChunkError::DimensionMismatch { ordinal, .. }
            | ChunkError::Timeout { ordinal, .. } => ordinal,
        }
    }
}

/// Where a chunk ended up after a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    /// Neither a metadata row nor a point was written
    NotPersisted,
    /// The metadata row is committed but has no point
    MetadataOnly,
    /// The point was written but the row does not record it yet
    PointWritten,
    /// Row and point both written and linked
    Complete,
    /// Already complete with identical text, left untouched
    Skipped,
    /// Not attempted because the run aborted first
    Cancelled,
}

/// One point produced (or confirmed) by a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestedPoint {
    pub point_id: u64,
    pub chunk_id: Uuid,
    /// 1-based, `ordinal + 1`
    pub page_number: u32,
    pub ordinal: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFailure {
    pub ordinal: usize,
    pub error: ChunkError,
}

/// Outcome of a run under the continue policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub document: String,
    pub collection: String,
    pub configuration_id: Uuid,
    /// Width of the collection's vectors
    pub vector_width: usize,
    pub total_chunks: usize,
    /// Written and skipped points, ordered by ordinal
    pub points: Vec<IngestedPoint>,
    pub failures: Vec<ChunkFailure>,
    /// Chunks stored with a fallback vector
    pub degraded_ordinals: Vec<usize>,
    pub skipped_ordinals: Vec<usize>,
    pub outcomes: BTreeMap<usize, ChunkStatus>,
}

impl IngestReport {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Ordinals to pass to [`IngestRequest::with_ordinals`] for a retry
    #[inline]
    pub fn failed_ordinals(&self) -> Vec<usize> {
        self.failures.iter().map(|failure| failure.ordinal).collect()
    }
}

/// A document upload to ingest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRequest {
    pub document: Vec<u8>,
    /// Selects the extractor by extension and names the source
    pub filename: String,
    pub collection: String,
    pub configuration_id: Uuid,
    /// Restrict the run to these ordinals; `None` processes every chunk
    pub ordinals: Option<BTreeSet<usize>>,
}

impl IngestRequest {
    #[inline]
    pub fn new(
        document: Vec<u8>,
        filename: impl Into<String>,
        collection: impl Into<String>,
        configuration_id: Uuid,
    ) -> Self {
        Self {
            document,
            filename: filename.into(),
            collection: collection.into(),
            configuration_id,
            ordinals: None,
        }
    }

    #[inline]
    pub fn with_ordinals(mut self, ordinals: impl IntoIterator<Item = usize>) -> Self {
        self.ordinals = Some(ordinals.into_iter().collect());
        self
    }
}

/// State fixed for the per-chunk stage of a run
struct RunContext<'a> {
    document: &'a str,
    collection: &'a str,
    configuration_id: Uuid,
    total_chunks: u32,
    width: usize,
    ids: PointIdBlock,
    aborted: AtomicBool,
}

struct WorkItem {
    chunk: ContentChunk,
    existing: Option<KnowledgeChunk>,
    probe: Option<Embedding>,
}

struct ChunkResult {
    ordinal: usize,
    status: ChunkStatus,
    degraded: bool,
    /// `None` when the chunk was cancelled by an aborted run
    outcome: Option<std::result::Result<IngestedPoint, ChunkError>>,
}

/// How far a chunk got, updated as each step lands
struct ChunkProgress {
    status: ChunkStatus,
    degraded: bool,
}

/// Orchestrates extraction, chunking, embedding and the writes to both stores
pub struct IngestionCoordinator {
    metadata: Arc<dyn MetadataStore>,
    vectors: Arc<dyn VectorIndex>,
    embedder: Embedder,
    chunking: ChunkingConfig,
    failure_policy: FailurePolicy,
    max_concurrent_chunks: usize,
    store_timeout: Duration,
    fallback_dimension: usize,
    point_ids: PointIdAllocator,
}

impl IngestionCoordinator {
    #[inline]
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        vectors: Arc<dyn VectorIndex>,
        embedder: Embedder,
    ) -> Self {
        Self {
            metadata,
            vectors,
            embedder,
            chunking: ChunkingConfig::default(),
            failure_policy: FailurePolicy::default(),
            max_concurrent_chunks: 1,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            fallback_dimension: DEFAULT_FALLBACK_DIMENSION,
            point_ids: PointIdAllocator::new(),
        }
    }

    /// Build a coordinator using the HTTP embedding service and settings from `config`
    #[inline]
    pub fn from_config(
        config: &Config,
        metadata: Arc<dyn MetadataStore>,
        vectors: Arc<dyn VectorIndex>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| IngestError::Config(e.to_string()))?;

        let client = HttpEmbeddingClient::new(&config.embedding)?;
        let embed_timeout = client.call_budget();
        let client = client.with_deadline(embed_timeout);
        let embedder = Embedder::new(Arc::new(client), embed_timeout);

        Ok(Self::new(metadata, vectors, embedder)
            .with_chunking(config.chunking.clone())
            .with_failure_policy(config.ingestion.failure_policy)
            .with_max_concurrent_chunks(config.ingestion.max_concurrent_chunks)
            .with_store_timeout(config.ingestion.store_timeout())
            .with_fallback_dimension(config.embedding.fallback_dimension))
    }

    #[inline]
    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    #[inline]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    #[inline]
    pub fn with_max_concurrent_chunks(mut self, max: usize) -> Self {
        self.max_concurrent_chunks = max.max(1);
        self
    }

    #[inline]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    #[inline]
    pub fn with_fallback_dimension(mut self, width: usize) -> Self {
        self.fallback_dimension = width.max(1);
        self
    }

    #[inline]
    pub fn with_point_ids(mut self, allocator: PointIdAllocator) -> Self {
        self.point_ids = allocator;
        self
    }

    /// Ingest one document.
    ///
    /// Invalid or empty documents fail before either store is touched.
    /// Per-chunk failures are collected in the report under
    /// [`FailurePolicy::Continue`] and end the run with
    /// [`IngestError::ChunkFailed`] under [`FailurePolicy::Abort`].
    #[inline]
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestReport> {
        let document = request.filename.clone();
        let result = self.run(request).await;

        match &result {
            Ok(report) => {
                debug!("{}: stage {}", document, RunStage::Done);
                info!(
                    "Ingested '{}' into {}: {} points, {} skipped, {} degraded, {} failed",
                    document,
                    report.collection,
                    report.points.len(),
                    report.skipped_ordinals.len(),
                    report.degraded_ordinals.len(),
                    report.failures.len()
                );
            }
            Err(e) => {
                debug!("{}: stage {}", document, RunStage::Failed);
                error!("Ingestion of '{}' failed: {}", document, e);
            }
        }

        result
    }

    async fn run(&self, request: IngestRequest) -> Result<IngestReport> {
        let IngestRequest {
            document: bytes,
            filename,
            collection,
            configuration_id,
            ordinals,
        } = request;

        debug!("{}: stage {}", filename, RunStage::Extracting);
        if bytes.is_empty() {
            return Err(IngestError::InvalidInput(format!(
                "No document bytes supplied for '{}'",
                filename
            )));
        }
        let format = DocumentFormat::from_filename(&filename)
            .map_err(|e| IngestError::InvalidInput(e.to_string()))?;
        validate_collection_name(&collection)
            .map_err(|e| IngestError::InvalidInput(e.to_string()))?;

        let text = tokio::task::spawn_blocking(move || extract_text(&bytes, format))
            .await
            .map_err(|e| anyhow::anyhow!("Extraction task failed: {}", e))?
            .map_err(|e| match e {
                ExtractError::UnsupportedFormat(message) => IngestError::InvalidInput(message),
                other => IngestError::Extraction {
                    document: filename.clone(),
                    message: other.to_string(),
                },
            })?;

        debug!("{}: stage {}", filename, RunStage::Normalizing);
        let normalized = normalize_text(&text);
        if normalized.is_empty() {
            return Err(IngestError::EmptyDocument { document: filename });
        }

        debug!("{}: stage {}", filename, RunStage::Chunking);
        let chunks = chunk_content(&normalized, &self.chunking);
        let total_chunks = u32::try_from(chunks.len()).map_err(|_| {
            IngestError::InvalidInput(format!("'{}' produced too many chunks", filename))
        })?;

        if let Some(selected) = &ordinals {
            if let Some(out_of_range) = selected.iter().find(|&&o| o >= chunks.len()) {
                return Err(IngestError::InvalidInput(format!(
                    "Ordinal {} is out of range: '{}' has {} chunks",
                    out_of_range,
                    filename,
                    chunks.len()
                )));
            }
        }

        let mut existing = self
            .load_existing(configuration_id, &filename, total_chunks)
            .await?;

        let mut points = Vec::new();
        let mut skipped_ordinals = Vec::new();
        let mut outcomes = BTreeMap::new();
        let mut work = Vec::new();

        for chunk in chunks {
            if let Some(selected) = &ordinals {
                if !selected.contains(&chunk.ordinal) {
                    continue;
                }
            }

            let row = existing.remove(&chunk.ordinal);
            match row {
                Some(row) if row.is_indexed() && row.content == chunk.content => {
                    if let Some(point_id) = row.point_id() {
                        debug!(
                            "{}: chunk {} unchanged, skipping",
                            filename, chunk.ordinal
                        );
                        points.push(IngestedPoint {
                            point_id,
                            chunk_id: row.id,
                            page_number: row.page_number,
                            ordinal: chunk.ordinal,
                        });
                        skipped_ordinals.push(chunk.ordinal);
                        outcomes.insert(chunk.ordinal, ChunkStatus::Skipped);
                        continue;
                    }
                    work.push(WorkItem {
                        chunk,
                        existing: Some(row),
                        probe: None,
                    });
                }
                row => work.push(WorkItem {
                    chunk,
                    existing: row,
                    probe: None,
                }),
            }
        }

        debug!("{}: stage {}", filename, RunStage::Probing);
        let requested_width = match work.first_mut() {
            Some(first) => {
                let probe = self
                    .embedder
                    .embed(&first.chunk.content, self.fallback_dimension)
                    .await;
                let width = probe.width();
                first.probe = Some(probe);
                width
            }
            None => self.fallback_dimension,
        };

        let width = self
            .bounded(self.vectors.ensure_collection(&collection, requested_width))
            .await
            .map_err(|message| IngestError::CollectionProvisionFailed {
                collection: collection.clone(),
                message,
            })?;
        if width != requested_width {
            info!(
                "Collection {} already has {} dimensions (first embedding had {})",
                collection, width, requested_width
            );
        }

        let context = RunContext {
            document: &filename,
            collection: &collection,
            configuration_id,
            total_chunks,
            width,
            ids: self.point_ids.reserve(total_chunks as usize),
            aborted: AtomicBool::new(false),
        };

        debug!(
            "{}: stage {} ({} chunks to process)",
            filename,
            RunStage::PerChunk,
            work.len()
        );
        let context_ref = &context;
        let mut results: Vec<ChunkResult> = futures::stream::iter(work)
            .map(|item| self.process_chunk(context_ref, item))
            .buffer_unordered(self.max_concurrent_chunks)
            .collect()
            .await;
        results.sort_by_key(|result| result.ordinal);

        let mut failures = Vec::new();
        let mut degraded_ordinals = Vec::new();
        for result in results {
            if result.degraded {
                degraded_ordinals.push(result.ordinal);
            }
            outcomes.insert(result.ordinal, result.status);
            match result.outcome {
                Some(Ok(point)) => points.push(point),
                Some(Err(error)) => failures.push(ChunkFailure {
                    ordinal: result.ordinal,
                    error,
                }),
                None => {}
            }
        }
        points.sort_by_key(|point| point.ordinal);

        if self.failure_policy == FailurePolicy::Abort && !failures.is_empty() {
            let first = failures.remove(0);
            return Err(IngestError::ChunkFailed {
                document: filename,
                ordinal: first.ordinal,
                source: first.error,
                completed: points,
            });
        }

        Ok(IngestReport {
            document: filename,
            collection,
            configuration_id,
            vector_width: width,
            total_chunks: total_chunks as usize,
            points,
            failures,
            degraded_ordinals,
            skipped_ordinals,
            outcomes,
        })
    }

    /// Rows already stored for this source, keyed by ordinal
    async fn load_existing(
        &self,
        configuration_id: Uuid,
        source_name: &str,
        total_chunks: u32,
    ) -> Result<HashMap<usize, KnowledgeChunk>> {
        let rows = self
            .bounded(self.metadata.chunks_for_source(configuration_id, source_name))
            .await
            .map_err(IngestError::Database)?;

        if let Some(row) = rows.iter().find(|row| row.total_chunks != total_chunks) {
            return Err(IngestError::InvalidInput(format!(
                "'{}' was previously ingested as {} chunks but now has {}; delete the source before re-ingesting",
                source_name, row.total_chunks, total_chunks
            )));
        }

        if !rows.is_empty() {
            debug!(
                "{}: found {} existing rows for configuration {}",
                source_name,
                rows.len(),
                configuration_id
            );
        }

        Ok(rows
            .into_iter()
            .map(|row| (row.chunk_index as usize, row))
            .collect())
    }

    /// Steps 1-5 for a single chunk
    async fn process_chunk(&self, run: &RunContext<'_>, item: WorkItem) -> ChunkResult {
        let ordinal = item.chunk.ordinal;

        if run.aborted.load(Ordering::Acquire) {
            debug!("{}: chunk {} cancelled", run.document, ordinal);
            return ChunkResult {
                ordinal,
                status: ChunkStatus::Cancelled,
                degraded: false,
                outcome: None,
            };
        }

        let mut progress = ChunkProgress {
            status: if item.existing.is_some() {
                ChunkStatus::MetadataOnly
            } else {
                ChunkStatus::NotPersisted
            },
            degraded: false,
        };

        let outcome = self.write_chunk(run, item, &mut progress).await;
        if let Err(e) = &outcome {
            error!("{}: chunk {} failed: {}", run.document, ordinal, e);
            if self.failure_policy == FailurePolicy::Abort {
                run.aborted.store(true, Ordering::Release);
            }
        }

        ChunkResult {
            ordinal,
            status: progress.status,
            degraded: progress.degraded,
            outcome: Some(outcome),
        }
    }

    async fn write_chunk(
        &self,
        run: &RunContext<'_>,
        item: WorkItem,
        progress: &mut ChunkProgress,
    ) -> std::result::Result<IngestedPoint, ChunkError> {
        let WorkItem {
            chunk,
            existing,
            probe,
        } = item;
        let ordinal = chunk.ordinal;
        let mut uow = self.metadata.unit_of_work();

        // Step 1: commit the metadata row before embedding
        let reused_pending = existing.as_ref().is_some_and(|row| !row.is_indexed());
        let (mut row, previous_point) = match existing {
            Some(mut row) => {
                let previous_point = row.point_id();
                if row.content != chunk.content || row.is_indexed() {
                    row.reset_content(chunk.content.clone());
                    uow.update_chunk(row.clone());
                }
                (row, previous_point)
            }
            None => {
                let chunk_index = ordinal as u32;
                let row = KnowledgeChunk::new(
                    run.configuration_id,
                    run.document,
                    chunk_index,
                    run.total_chunks,
                    chunk.content.clone(),
                );
                uow.add_chunk(row.clone());
                (row, None)
            }
        };
        self.commit(ordinal, "metadata write", uow.as_mut()).await?;
        progress.status = ChunkStatus::MetadataOnly;

        // Step 2: embed, reusing the probe for the first chunk
        let mut embedding = match probe {
            Some(probe) => probe,
            None => self.embedder.embed(&chunk.content, run.width).await,
        };
        if let Some(reason) = &embedding.degraded {
            warn!(
                "{}: chunk {} stored with a fallback vector: {}",
                run.document, ordinal, reason
            );
            progress.degraded = true;
        }

        if embedding.width() != run.width {
            if embedding.is_degraded() {
                embedding.vector = fallback_vector(run.width);
            } else {
                return Err(ChunkError::DimensionMismatch {
                    ordinal,
                    expected: run.width,
                    actual: embedding.width(),
                });
            }
        }

        // Step 3: reuse the point of a re-ingested row so the upsert replaces it
        let point_id = match previous_point.or_else(|| run.ids.id_for(ordinal)) {
            Some(id) => id,
            None => {
                return Err(ChunkError::VectorWriteFailed {
                    ordinal,
                    message: "no point id reserved for this ordinal".to_string(),
                });
            }
        };

        // A pending row may already have a point from a run whose provenance
        // update failed; the fresh id would leave that point orphaned
        if reused_pending {
            match tokio::time::timeout(
                self.store_timeout,
                self.vectors.delete_by_chunk(run.collection, row.id),
            )
            .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    return Err(ChunkError::VectorWriteFailed {
                        ordinal,
                        message: format!("failed to clear stale points: {}", e),
                    });
                }
                Err(_) => {
                    return Err(ChunkError::Timeout {
                        ordinal,
                        operation: "stale point cleanup",
                        timeout: self.store_timeout,
                    });
                }
            }
        }

        // Step 4: write the point
        let point = VectorPoint {
            id: point_id,
            vector: embedding.vector,
            payload: PointPayload {
                chunk_id: row.id,
                chunk_index: row.chunk_index,
                content: chunk.content,
                configuration_id: run.configuration_id,
                source_name: run.document.to_string(),
            },
        };
        match tokio::time::timeout(
            self.store_timeout,
            self.vectors.upsert_point(run.collection, point),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(ChunkError::VectorWriteFailed {
                    ordinal,
                    message: e.to_string(),
                });
            }
            Err(_) => {
                return Err(ChunkError::Timeout {
                    ordinal,
                    operation: "vector write",
                    timeout: self.store_timeout,
                });
            }
        }
        progress.status = ChunkStatus::PointWritten;

        // Step 5: record the point on the row
        row.mark_indexed(point_id);
        uow.update_chunk(row.clone());
        self.commit(ordinal, "provenance update", uow.as_mut())
            .await?;
        progress.status = ChunkStatus::Complete;

        debug!(
            "{}: chunk {} stored as point {}",
            run.document, ordinal, point_id
        );

        Ok(IngestedPoint {
            point_id,
            chunk_id: row.id,
            page_number: row.page_number,
            ordinal,
        })
    }

    async fn commit(
        &self,
        ordinal: usize,
        operation: &'static str,
        uow: &mut dyn UnitOfWork,
    ) -> std::result::Result<usize, ChunkError> {
        match tokio::time::timeout(self.store_timeout, uow.save_changes()).await {
            Ok(Ok(applied)) => Ok(applied),
            Ok(Err(e)) => Err(ChunkError::MetadataWriteFailed {
                ordinal,
                message: format!("{:#}", e),
            }),
            Err(_) => Err(ChunkError::Timeout {
                ordinal,
                operation,
                timeout: self.store_timeout,
            }),
        }
    }

    /// Run a store call under the store timeout, flattening errors to messages
    async fn bounded<T, E, F>(&self, call: F) -> std::result::Result<T, String>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: fmt::Display,
    {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(format!("{:#}", e)),
            Err(_) => Err(format!("timed out after {:?}", self.store_timeout)),
        }
    }

    /// Delete every point and row for one source: points first, then rows.
    /// Returns the number of rows deleted.
    #[inline]
    pub async fn delete_source(
        &self,
        configuration_id: Uuid,
        source_name: &str,
        collection: &str,
    ) -> Result<u64> {
        info!(
            "Deleting source {} of configuration {} from {}",
            source_name, configuration_id, collection
        );

        self.bounded(
            self.vectors
                .delete_by_source(collection, configuration_id, source_name),
        )
        .await
        .map_err(|message| {
            IngestError::Database(format!(
                "Failed to delete points for {}: {}",
                source_name, message
            ))
        })?;

        self.bounded(self.metadata.delete_source(configuration_id, source_name))
            .await
            .map_err(|message| {
                IngestError::Database(format!(
                    "Points for {} were deleted but rows were not: {}",
                    source_name, message
                ))
            })
    }

    /// Delete every point and row of a configuration: points first, then rows.
    /// Returns the number of rows deleted.
    #[inline]
    pub async fn delete_configuration(&self, configuration_id: Uuid, collection: &str) -> Result<u64> {
        info!(
            "Deleting configuration {} from {}",
            configuration_id, collection
        );

        self.bounded(
            self.vectors
                .delete_by_configuration(collection, configuration_id),
        )
        .await
        .map_err(|message| {
            IngestError::Database(format!(
                "Failed to delete points for configuration {}: {}",
                configuration_id, message
            ))
        })?;

        self.bounded(self.metadata.delete_configuration(configuration_id))
            .await
            .map_err(|message| {
                IngestError::Database(format!(
                    "Points for configuration {} were deleted but rows were not: {}",
                    configuration_id, message
                ))
            })
    }

    /// Consistency checks over the same stores this coordinator writes to
    #[inline]
    pub fn validator(&self) -> ConsistencyValidator<'_> {
        ConsistencyValidator::new(self.metadata.as_ref(), self.vectors.as_ref())
    }
}
