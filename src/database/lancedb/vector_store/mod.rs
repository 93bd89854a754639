
use super::{
    PointPayload, StoredPoint, VectorPoint, chunk_predicate, configuration_predicate,
    ids_predicate, source_predicate,
};
use crate::config::{Config, validate_collection_name};
use crate::database::VectorIndex;
use crate::IngestError;
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
    UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, Table};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Vector database store using LanceDB, one table per collection
#[derive(Clone)]
pub struct LanceVectorStore {
    connection: Connection,
}

impl std::fmt::Debug for LanceVectorStore {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanceVectorStore")
            .field("uri", &self.connection.uri())
            .finish()
    }
}

fn db_error(context: &str, e: impl std::fmt::Display) -> IngestError {
    IngestError::Database(format!("{}: {}", context, e))
}

impl LanceVectorStore {
    /// Open the vector database configured for this installation
    #[inline]
    pub async fn from_config(config: &Config) -> crate::Result<Self> {
        Self::open(&config.vector_database_path()).await
    }

    /// Open (or create) a LanceDB database directory
    ///
    /// # Arguments
    /// * `db_path` - Directory holding the LanceDB tables
    #[inline]
    pub async fn open(db_path: &Path) -> crate::Result<Self> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(db_path)
            .map_err(|e| db_error("Failed to create vector database directory", e))?;

        let uri = format!("file://{}", db_path.display());

        let connection = match lancedb::connect(&uri).execute().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Failed to connect to LanceDB: {}", e);

                let error_msg = e.to_string().to_lowercase();
                if error_msg.contains("corrupt") || error_msg.contains("malformed") {
                    warn!("Database corruption detected, attempting recovery");
                    Self::attempt_corruption_recovery(db_path)?;

                    lancedb::connect(&uri).execute().await.map_err(|e| {
                        db_error("Failed to connect to LanceDB after recovery", e)
                    })?
                } else {
                    return Err(db_error("Failed to connect to LanceDB", e));
                }
            }
        };

        info!("Vector store opened at {}", db_path.display());
        Ok(Self { connection })
    }

    /// Schema for a collection with the given vector width
    fn create_schema(vector_dim: usize) -> crate::Result<Arc<Schema>> {
        let width = i32::try_from(vector_dim)
            .map_err(|_| IngestError::InvalidInput(format!("Vector width {} is too large", vector_dim)))?;

        Ok(Arc::new(Schema::new(vec![
            Field::new("id", DataType::UInt64, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    width,
                ),
                false,
            ),
            Field::new("chunk_id", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("configuration_id", DataType::Utf8, false),
            Field::new("source_name", DataType::Utf8, false),
            Field::new("created_at", DataType::Utf8, false),
        ])))
    }

    async fn has_collection(&self, collection: &str) -> crate::Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| db_error("Failed to list tables", e))?;

        Ok(table_names.iter().any(|name| name == collection))
    }

    async fn open_collection(&self, collection: &str) -> crate::Result<Table> {
        self.connection
            .open_table(collection)
            .execute()
            .await
            .map_err(|e| db_error(&format!("Failed to open collection {}", collection), e))
    }

    /// Open the collection, or `None` if it has not been created yet
    async fn existing_collection(&self, collection: &str) -> crate::Result<Option<Table>> {
        if self.has_collection(collection).await? {
            Ok(Some(self.open_collection(collection).await?))
        } else {
            Ok(None)
        }
    }

    /// Detect vector dimension from an existing table schema
    async fn collection_width(table: &Table) -> crate::Result<usize> {
        let schema = table
            .schema()
            .await
            .map_err(|e| db_error("Failed to get table schema", e))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return usize::try_from(*size)
                        .map_err(|e| db_error("Invalid vector column width", e));
                }
            }
        }

        Err(IngestError::Database(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    /// Create a RecordBatch holding a single point
    fn create_record_batch(point: &VectorPoint, vector_dim: usize) -> crate::Result<RecordBatch> {
        let schema = Self::create_schema(vector_dim)?;
        let payload: &PointPayload = &point.payload;

        let values_array = Float32Array::from(point.vector.clone());
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let width = i32::try_from(vector_dim)
            .map_err(|e| db_error("Invalid vector width", e))?;
        let vector_array = FixedSizeListArray::try_new(field, width, Arc::new(values_array), None)
            .map_err(|e| db_error("Failed to create vector array", e))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(UInt64Array::from(vec![point.id])),
            Arc::new(vector_array),
            Arc::new(StringArray::from(vec![payload.chunk_id.to_string()])),
            Arc::new(UInt32Array::from(vec![payload.chunk_index])),
            Arc::new(StringArray::from(vec![payload.content.as_str()])),
            Arc::new(StringArray::from(vec![payload.configuration_id.to_string()])),
            Arc::new(StringArray::from(vec![payload.source_name.as_str()])),
            Arc::new(StringArray::from(vec![Utc::now().to_rfc3339()])),
        ];

        RecordBatch::try_new(schema, arrays).map_err(|e| db_error("Failed to create record batch", e))
    }

    /// Parse a batch of listed points
    fn parse_point_batch(batch: &RecordBatch) -> crate::Result<Vec<StoredPoint>> {
        let ids = batch
            .column_by_name("id")
            .ok_or_else(|| IngestError::Database("Missing id column".to_string()))?
            .as_any()
            .downcast_ref::<UInt64Array>()
            .ok_or_else(|| IngestError::Database("Invalid id column type".to_string()))?;

        let chunk_ids = batch
            .column_by_name("chunk_id")
            .ok_or_else(|| IngestError::Database("Missing chunk_id column".to_string()))?
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| IngestError::Database("Invalid chunk_id column type".to_string()))?;

        let chunk_indices = batch
            .column_by_name("chunk_index")
            .ok_or_else(|| IngestError::Database("Missing chunk_index column".to_string()))?
            .as_any()
            .downcast_ref::<UInt32Array>()
            .ok_or_else(|| IngestError::Database("Invalid chunk_index column type".to_string()))?;

        let source_names = batch
            .column_by_name("source_name")
            .ok_or_else(|| IngestError::Database("Missing source_name column".to_string()))?
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| IngestError::Database("Invalid source_name column type".to_string()))?;

        Ok((0..batch.num_rows())
            .map(|row| StoredPoint {
                id: ids.value(row),
                chunk_id: chunk_ids.value(row).to_string(),
                chunk_index: chunk_indices.value(row),
                source_name: source_names.value(row).to_string(),
            })
            .collect())
    }

    async fn delete_where(&self, collection: &str, predicate: &str) -> crate::Result<()> {
        let Some(table) = self.existing_collection(collection).await? else {
            debug!("Collection {} does not exist, nothing to delete", collection);
            return Ok(());
        };

        table
            .delete(predicate)
            .await
            .map_err(|e| db_error("Failed to delete points", e))?;

        debug!("Deleted points from {} where {}", collection, predicate);
        Ok(())
    }

    /// Optimize a collection by compacting and reorganizing data
    #[inline]
    pub async fn optimize(&self, collection: &str) -> crate::Result<()> {
        debug!("Optimizing collection {}", collection);

        let Some(table) = self.existing_collection(collection).await? else {
            return Ok(());
        };

        table
            .optimize(lancedb::table::OptimizeAction::All)
            .await
            .map_err(|e| db_error("Failed to optimize table", e))?;

        info!("Collection {} optimized", collection);
        Ok(())
    }

    /// Attempt to recover from database corruption
    fn attempt_corruption_recovery(db_path: &Path) -> crate::Result<()> {
        warn!("Attempting database corruption recovery at {:?}", db_path);

        if db_path.exists() {
            let backup_path: PathBuf = db_path.with_extension("corrupted_backup");
            if let Err(e) = std::fs::rename(db_path, &backup_path) {
                error!("Failed to backup corrupted database: {}", e);
            } else {
                info!("Corrupted database backed up to {:?}", backup_path);
            }
        }

        if db_path.exists() {
            std::fs::remove_dir_all(db_path)
                .map_err(|e| db_error("Failed to remove corrupted database", e))?;
        }

        std::fs::create_dir_all(db_path)
            .map_err(|e| db_error("Failed to recreate vector database directory", e))?;

        info!("Database corruption recovery completed");
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for LanceVectorStore {
    #[inline]
    async fn ensure_collection(&self, collection: &str, width: usize) -> crate::Result<usize> {
        validate_collection_name(collection).map_err(|e| IngestError::InvalidInput(e.to_string()))?;

        if let Some(table) = self.existing_collection(collection).await? {
            let existing = Self::collection_width(&table).await?;
            debug!(
                "Collection {} already exists with {} dimensions",
                collection, existing
            );
            return Ok(existing);
        }

        let schema = Self::create_schema(width)?;
        match self
            .connection
            .create_empty_table(collection, schema)
            .execute()
            .await
        {
            Ok(_) => {
                info!("Created collection {} with {} dimensions", collection, width);
                Ok(width)
            }
            Err(e) => {
                // Another run may have created it between the check and the create
                if let Some(table) = self.existing_collection(collection).await? {
                    warn!("Collection {} appeared concurrently: {}", collection, e);
                    Self::collection_width(&table).await
                } else {
                    Err(db_error(&format!("Failed to create collection {}", collection), e))
                }
            }
        }
    }

    #[inline]
    async fn upsert_point(&self, collection: &str, point: VectorPoint) -> crate::Result<()> {
        let table = self.open_collection(collection).await?;
        let width = Self::collection_width(&table).await?;

        if point.vector.len() != width {
            return Err(IngestError::Database(format!(
                "Point {} has {} dimensions but collection {} expects {}",
                point.id,
                point.vector.len(),
                collection,
                width
            )));
        }

        let record_batch = Self::create_record_batch(&point, width)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        let mut merge = table.merge_insert(&["id"]);
        merge.when_matched_update_all(None).when_not_matched_insert_all();
        merge
            .execute(Box::new(reader))
            .await
            .map_err(|e| db_error("Failed to upsert point", e))?;

        debug!("Upserted point {} into {}", point.id, collection);
        Ok(())
    }

    #[inline]
    async fn list_points(
        &self,
        collection: &str,
        configuration_id: Uuid,
    ) -> crate::Result<Vec<StoredPoint>> {
        let Some(table) = self.existing_collection(collection).await? else {
            return Ok(Vec::new());
        };

        let predicate = configuration_predicate(configuration_id);
        let total = table
            .count_rows(Some(predicate.clone()))
            .await
            .map_err(|e| db_error("Failed to count rows", e))?;
        if total == 0 {
            return Ok(Vec::new());
        }

        let mut results = table
            .query()
            .only_if(predicate)
            .select(Select::columns(&[
                "id",
                "chunk_id",
                "chunk_index",
                "source_name",
            ]))
            .limit(total)
            .execute()
            .await
            .map_err(|e| db_error("Failed to execute query", e))?;

        let mut points = Vec::with_capacity(total);
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| db_error("Failed to read result stream", e))?
        {
            points.extend(Self::parse_point_batch(&batch)?);
        }

        points.sort_by(|a, b| {
            a.source_name
                .cmp(&b.source_name)
                .then(a.chunk_index.cmp(&b.chunk_index))
        });
        Ok(points)
    }

    #[inline]
    async fn delete_points(&self, collection: &str, ids: &[u64]) -> crate::Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.delete_where(collection, &ids_predicate(ids)).await
    }

    #[inline]
    async fn delete_by_chunk(&self, collection: &str, chunk_id: Uuid) -> crate::Result<()> {
        self.delete_where(collection, &chunk_predicate(chunk_id))
            .await
    }

    #[inline]
    async fn delete_by_source(
        &self,
        collection: &str,
        configuration_id: Uuid,
        source_name: &str,
    ) -> crate::Result<()> {
        self.delete_where(collection, &source_predicate(configuration_id, source_name))
            .await
    }

    #[inline]
    async fn delete_by_configuration(
        &self,
        collection: &str,
        configuration_id: Uuid,
    ) -> crate::Result<()> {
        self.delete_where(collection, &configuration_predicate(configuration_id))
            .await
    }

    #[inline]
    async fn count(&self, collection: &str) -> crate::Result<usize> {
        let Some(table) = self.existing_collection(collection).await? else {
            return Ok(0);
        };

        table
            .count_rows(None)
            .await
            .map_err(|e| db_error("Failed to count rows", e))
    }
}
