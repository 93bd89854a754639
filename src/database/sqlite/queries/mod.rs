#[cfg(test)]
mod tests;

use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Sqlite, SqliteExecutor};
use tracing::{debug, warn};
use uuid::Uuid;

const CHUNK_COLUMNS: &str = "id, configuration_id, source_type, source_name, chunk_index, \
     total_chunks, page_number, content, metadata, status, created_date, updated_date";

pub struct KnowledgeChunkQueries;

impl KnowledgeChunkQueries {
    #[inline]
    pub async fn insert<'e, E>(executor: E, chunk: &KnowledgeChunk) -> Result<()>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query(&format!(
            "INSERT INTO knowledge_chunks ({CHUNK_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(chunk.id)
        .bind(chunk.configuration_id)
        .bind(&chunk.source_type)
        .bind(&chunk.source_name)
        .bind(chunk.chunk_index)
        .bind(chunk.total_chunks)
        .bind(chunk.page_number)
        .bind(&chunk.content)
        .bind(&chunk.metadata)
        .bind(chunk.status)
        .bind(chunk.created_date)
        .bind(chunk.updated_date)
        .execute(executor)
        .await
        .with_context(|| {
            format!(
                "Failed to insert chunk {} of {}",
                chunk.chunk_index, chunk.source_name
            )
        })?;

        debug!(
            "Inserted chunk {} ({} #{})",
            chunk.id, chunk.source_name, chunk.chunk_index
        );
        Ok(())
    }

    /// Update the mutable columns of an existing row. Returns false if no row matched.
    #[inline]
    pub async fn update<'e, E>(executor: E, chunk: &KnowledgeChunk) -> Result<bool>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE knowledge_chunks
            SET content = ?, metadata = ?, status = ?, total_chunks = ?, updated_date = ?
            WHERE id = ?
            "#,
        )
        .bind(&chunk.content)
        .bind(&chunk.metadata)
        .bind(chunk.status)
        .bind(chunk.total_chunks)
        .bind(Utc::now())
        .bind(chunk.id)
        .execute(executor)
        .await
        .with_context(|| format!("Failed to update chunk {}", chunk.id))?;

        if result.rows_affected() == 0 {
            warn!("Update matched no row for chunk {}", chunk.id);
            return Ok(false);
        }

        Ok(true)
    }

    #[inline]
    pub async fn get_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<KnowledgeChunk>>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as::<Sqlite, KnowledgeChunk>(&format!(
            "SELECT {CHUNK_COLUMNS} FROM knowledge_chunks WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("Failed to get chunk by id")
    }

    #[inline]
    pub async fn list_by_source<'e, E>(
        executor: E,
        configuration_id: Uuid,
        source_name: &str,
    ) -> Result<Vec<KnowledgeChunk>>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as::<Sqlite, KnowledgeChunk>(&format!(
            "SELECT {CHUNK_COLUMNS} FROM knowledge_chunks \
             WHERE configuration_id = ? AND source_name = ? ORDER BY chunk_index"
        ))
        .bind(configuration_id)
        .bind(source_name)
        .fetch_all(executor)
        .await
        .context("Failed to list chunks for source")
    }

    #[inline]
    pub async fn list_by_configuration<'e, E>(
        executor: E,
        configuration_id: Uuid,
    ) -> Result<Vec<KnowledgeChunk>>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as::<Sqlite, KnowledgeChunk>(&format!(
            "SELECT {CHUNK_COLUMNS} FROM knowledge_chunks \
             WHERE configuration_id = ? ORDER BY source_name, chunk_index"
        ))
        .bind(configuration_id)
        .fetch_all(executor)
        .await
        .context("Failed to list chunks for configuration")
    }

    #[inline]
    pub async fn list_pending<'e, E>(executor: E) -> Result<Vec<KnowledgeChunk>>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as::<Sqlite, KnowledgeChunk>(&format!(
            "SELECT {CHUNK_COLUMNS} FROM knowledge_chunks \
             WHERE status = 'pending' ORDER BY configuration_id, source_name, chunk_index"
        ))
        .fetch_all(executor)
        .await
        .context("Failed to list pending chunks")
    }

    #[inline]
    pub async fn delete_by_source<'e, E>(
        executor: E,
        configuration_id: Uuid,
        source_name: &str,
    ) -> Result<u64>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query(
            "DELETE FROM knowledge_chunks WHERE configuration_id = ? AND source_name = ?",
        )
        .bind(configuration_id)
        .bind(source_name)
        .execute(executor)
        .await
        .context("Failed to delete chunks for source")?;

        Ok(result.rows_affected())
    }

    #[inline]
    pub async fn delete_by_configuration<'e, E>(executor: E, configuration_id: Uuid) -> Result<u64>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM knowledge_chunks WHERE configuration_id = ?")
            .bind(configuration_id)
            .execute(executor)
            .await
            .context("Failed to delete chunks for configuration")?;

        Ok(result.rows_affected())
    }

    /// Distinct configurations that own at least one chunk
    #[inline]
    pub async fn list_configurations<'e, E>(executor: E) -> Result<Vec<Uuid>>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_scalar::<Sqlite, Uuid>(
            "SELECT DISTINCT configuration_id FROM knowledge_chunks ORDER BY configuration_id",
        )
        .fetch_all(executor)
        .await
        .context("Failed to list configurations")
    }
}
