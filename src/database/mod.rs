// Database module
// Dual store: SQLite for chunk metadata, LanceDB for chunk vectors.
// The two are not transactionally linked; only the ingestion coordinator
// writes to or deletes from both.

pub mod lancedb;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

pub use self::lancedb::{LanceVectorStore, PointPayload, StoredPoint, VectorPoint};
pub use self::sqlite::models::{ChunkSyncStatus, FILE_SOURCE_TYPE, KnowledgeChunk};
pub use self::sqlite::{Database, SqliteUnitOfWork};

/// Staged metadata writes, committed together by [`UnitOfWork::save_changes`]
#[async_trait]
pub trait UnitOfWork: Send {
    fn add_chunk(&mut self, chunk: KnowledgeChunk);

    fn update_chunk(&mut self, chunk: KnowledgeChunk);

    /// Commit every staged write atomically, returning how many were applied.
    /// Staged writes are discarded whether or not the commit succeeds.
    async fn save_changes(&mut self) -> Result<usize>;
}

/// Relational store for [`KnowledgeChunk`] rows
#[async_trait]
pub trait MetadataStore: Send + Sync {
    fn unit_of_work(&self) -> Box<dyn UnitOfWork>;

    async fn chunks_for_source(
        &self,
        configuration_id: Uuid,
        source_name: &str,
    ) -> Result<Vec<KnowledgeChunk>>;

    async fn chunks_for_configuration(&self, configuration_id: Uuid)
    -> Result<Vec<KnowledgeChunk>>;

    async fn delete_source(&self, configuration_id: Uuid, source_name: &str) -> Result<u64>;

    async fn delete_configuration(&self, configuration_id: Uuid) -> Result<u64>;
}

/// Vector store holding one point per indexed chunk, grouped into collections
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create `collection` with vectors of `width` unless it already exists.
    /// Returns the width the collection actually has.
    async fn ensure_collection(&self, collection: &str, width: usize) -> crate::Result<usize>;

    /// Insert the point, replacing any point with the same id
    async fn upsert_point(&self, collection: &str, point: VectorPoint) -> crate::Result<()>;

    /// Points whose payload belongs to `configuration_id`
    async fn list_points(
        &self,
        collection: &str,
        configuration_id: Uuid,
    ) -> crate::Result<Vec<StoredPoint>>;

    async fn delete_points(&self, collection: &str, ids: &[u64]) -> crate::Result<()>;

    /// Remove every point whose payload names `chunk_id`
    async fn delete_by_chunk(&self, collection: &str, chunk_id: Uuid) -> crate::Result<()>;

    async fn delete_by_source(
        &self,
        collection: &str,
        configuration_id: Uuid,
        source_name: &str,
    ) -> crate::Result<()>;

    async fn delete_by_configuration(
        &self,
        collection: &str,
        configuration_id: Uuid,
    ) -> crate::Result<()>;

    async fn count(&self, collection: &str) -> crate::Result<usize>;
}
