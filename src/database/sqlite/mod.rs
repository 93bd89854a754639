use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::database::sqlite::models::KnowledgeChunk;
use crate::database::sqlite::queries::KnowledgeChunkQueries;
use crate::database::{MetadataStore, UnitOfWork};


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    #[inline]
    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(config_dir.join("metadata.db")).await
    }

    #[inline]
    pub async fn get_chunk(&self, id: Uuid) -> Result<Option<KnowledgeChunk>> {
        KnowledgeChunkQueries::get_by_id(&self.pool, id).await
    }

    /// Rows whose vector point was never recorded
    #[inline]
    pub async fn pending_chunks(&self) -> Result<Vec<KnowledgeChunk>> {
        KnowledgeChunkQueries::list_pending(&self.pool).await
    }

    #[inline]
    pub async fn configurations(&self) -> Result<Vec<Uuid>> {
        KnowledgeChunkQueries::list_configurations(&self.pool).await
    }

    /// Optimize database performance by running VACUUM and ANALYZE
    #[inline]
    pub async fn optimize(&self) -> Result<()> {
        info!("Optimizing database performance");

        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .context("Failed to vacuum database")?;

        sqlx::query("ANALYZE")
            .execute(&self.pool)
            .await
            .context("Failed to analyze database")?;

        debug!("Database optimization completed");
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for Database {
    #[inline]
    fn unit_of_work(&self) -> Box<dyn UnitOfWork> {
        Box::new(SqliteUnitOfWork::new(self.pool.clone()))
    }

    #[inline]
    async fn chunks_for_source(
        &self,
        configuration_id: Uuid,
        source_name: &str,
    ) -> Result<Vec<KnowledgeChunk>> {
        KnowledgeChunkQueries::list_by_source(&self.pool, configuration_id, source_name).await
    }

    #[inline]
    async fn chunks_for_configuration(
        &self,
        configuration_id: Uuid,
    ) -> Result<Vec<KnowledgeChunk>> {
        KnowledgeChunkQueries::list_by_configuration(&self.pool, configuration_id).await
    }

    #[inline]
    async fn delete_source(&self, configuration_id: Uuid, source_name: &str) -> Result<u64> {
        let deleted =
            KnowledgeChunkQueries::delete_by_source(&self.pool, configuration_id, source_name)
                .await?;
        info!(
            "Deleted {} chunk rows for source {} in configuration {}",
            deleted, source_name, configuration_id
        );
        Ok(deleted)
    }

    #[inline]
    async fn delete_configuration(&self, configuration_id: Uuid) -> Result<u64> {
        let deleted =
            KnowledgeChunkQueries::delete_by_configuration(&self.pool, configuration_id).await?;
        info!(
            "Deleted {} chunk rows for configuration {}",
            deleted, configuration_id
        );
        Ok(deleted)
    }
}

#[derive(Debug, Clone)]
enum StagedWrite {
    Add(KnowledgeChunk),
    Update(KnowledgeChunk),
}

/// Unit of work over the SQLite pool; staged writes commit in one transaction
#[derive(Debug)]
pub struct SqliteUnitOfWork {
    pool: DbPool,
    staged: Vec<StagedWrite>,
}

impl SqliteUnitOfWork {
    #[inline]
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            staged: Vec::new(),
        }
    }

    #[inline]
    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }
}

#[async_trait]
impl UnitOfWork for SqliteUnitOfWork {
    #[inline]
    fn add_chunk(&mut self, chunk: KnowledgeChunk) {
        self.staged.push(StagedWrite::Add(chunk));
    }

    #[inline]
    fn update_chunk(&mut self, chunk: KnowledgeChunk) {
        self.staged.push(StagedWrite::Update(chunk));
    }

    #[inline]
    async fn save_changes(&mut self) -> Result<usize> {
        let staged = std::mem::take(&mut self.staged);
        if staged.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        for write in &staged {
            match write {
                StagedWrite::Add(chunk) => {
                    KnowledgeChunkQueries::insert(&mut *tx, chunk).await?;
                }
                StagedWrite::Update(chunk) => {
                    if !KnowledgeChunkQueries::update(&mut *tx, chunk).await? {
                        anyhow::bail!("Chunk {} does not exist", chunk.id);
                    }
                }
            }
        }

        tx.commit().await.context("Failed to commit transaction")?;

        debug!("Committed {} staged chunk writes", staged.len());
        Ok(staged.len())
    }
}
