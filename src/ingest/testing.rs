// In-memory stores and embedding services for exercising the coordinator

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::IngestError;
use crate::database::{
    KnowledgeChunk, MetadataStore, StoredPoint, UnitOfWork, VectorIndex, VectorPoint,
};
use crate::embeddings::EmbeddingService;

#[derive(Debug, Default)]
struct MetadataState {
    rows: Mutex<BTreeMap<Uuid, KnowledgeChunk>>,
    fail_inserts_for: Mutex<HashSet<u32>>,
    fail_updates_for: Mutex<HashSet<u32>>,
    commits: AtomicUsize,
}

/// Metadata store keeping rows in memory, with injectable write failures
#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryMetadata {
    state: Arc<MetadataState>,
}

impl MemoryMetadata {
    pub(crate) fn fail_inserts_for(&self, chunk_index: u32) {
        self.state
            .fail_inserts_for
            .lock()
            .expect("lock")
            .insert(chunk_index);
    }

    pub(crate) fn fail_updates_for(&self, chunk_index: u32) {
        self.state
            .fail_updates_for
            .lock()
            .expect("lock")
            .insert(chunk_index);
    }

    pub(crate) fn clear_failures(&self) {
        self.state.fail_inserts_for.lock().expect("lock").clear();
        self.state.fail_updates_for.lock().expect("lock").clear();
    }

    pub(crate) fn rows(&self) -> Vec<KnowledgeChunk> {
        let mut rows: Vec<KnowledgeChunk> = self
            .state
            .rows
            .lock()
            .expect("lock")
            .values()
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.source_name
                .cmp(&b.source_name)
                .then(a.chunk_index.cmp(&b.chunk_index))
        });
        rows
    }

    pub(crate) fn commits(&self) -> usize {
        self.state.commits.load(Ordering::SeqCst)
    }

    /// Overwrite a stored row directly, bypassing any unit of work
    pub(crate) fn put_row(&self, row: KnowledgeChunk) {
        self.state.rows.lock().expect("lock").insert(row.id, row);
    }
}

enum Staged {
    Add(KnowledgeChunk),
    Update(KnowledgeChunk),
}

struct MemoryUnitOfWork {
    state: Arc<MetadataState>,
    staged: Vec<Staged>,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    fn add_chunk(&mut self, chunk: KnowledgeChunk) {
        self.staged.push(Staged::Add(chunk));
    }

    fn update_chunk(&mut self, chunk: KnowledgeChunk) {
        self.staged.push(Staged::Update(chunk));
    }

    async fn save_changes(&mut self) -> anyhow::Result<usize> {
        let staged = std::mem::take(&mut self.staged);
        let mut rows = self.state.rows.lock().expect("lock");
        let mut next = rows.clone();

        for write in &staged {
            match write {
                Staged::Add(chunk) => {
                    if self
                        .state
                        .fail_inserts_for
                        .lock()
                        .expect("lock")
                        .contains(&chunk.chunk_index)
                    {
                        anyhow::bail!("injected insert failure");
                    }
                    let duplicate = next.values().any(|row| {
                        row.configuration_id == chunk.configuration_id
                            && row.source_name == chunk.source_name
                            && row.chunk_index == chunk.chunk_index
                    });
                    if duplicate {
                        anyhow::bail!("UNIQUE constraint failed");
                    }
                    next.insert(chunk.id, chunk.clone());
                }
                Staged::Update(chunk) => {
                    if self
                        .state
                        .fail_updates_for
                        .lock()
                        .expect("lock")
                        .contains(&chunk.chunk_index)
                    {
                        anyhow::bail!("injected update failure");
                    }
                    if !next.contains_key(&chunk.id) {
                        anyhow::bail!("Chunk {} does not exist", chunk.id);
                    }
                    next.insert(chunk.id, chunk.clone());
                }
            }
        }

        *rows = next;
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        Ok(staged.len())
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadata {
    fn unit_of_work(&self) -> Box<dyn UnitOfWork> {
        Box::new(MemoryUnitOfWork {
            state: Arc::clone(&self.state),
            staged: Vec::new(),
        })
    }

    async fn chunks_for_source(
        &self,
        configuration_id: Uuid,
        source_name: &str,
    ) -> anyhow::Result<Vec<KnowledgeChunk>> {
        Ok(self
            .rows()
            .into_iter()
            .filter(|row| row.configuration_id == configuration_id && row.source_name == source_name)
            .collect())
    }

    async fn chunks_for_configuration(
        &self,
        configuration_id: Uuid,
    ) -> anyhow::Result<Vec<KnowledgeChunk>> {
        Ok(self
            .rows()
            .into_iter()
            .filter(|row| row.configuration_id == configuration_id)
            .collect())
    }

    async fn delete_source(&self, configuration_id: Uuid, source_name: &str) -> anyhow::Result<u64> {
        let mut rows = self.state.rows.lock().expect("lock");
        let before = rows.len();
        rows.retain(|_, row| {
            !(row.configuration_id == configuration_id && row.source_name == source_name)
        });
        Ok((before - rows.len()) as u64)
    }

    async fn delete_configuration(&self, configuration_id: Uuid) -> anyhow::Result<u64> {
        let mut rows = self.state.rows.lock().expect("lock");
        let before = rows.len();
        rows.retain(|_, row| row.configuration_id != configuration_id);
        Ok((before - rows.len()) as u64)
    }
}

#[derive(Debug, Default)]
struct Collection {
    width: usize,
    points: BTreeMap<u64, VectorPoint>,
}

/// Vector index keeping collections in memory, with injectable failures
#[derive(Debug, Default)]
pub(crate) struct MemoryVectors {
    collections: Mutex<HashMap<String, Collection>>,
    fail_upserts_for: Mutex<HashSet<u32>>,
    fail_ensure: AtomicBool,
    fail_deletes: AtomicBool,
    upsert_delay: Mutex<Option<Duration>>,
    ensure_calls: AtomicUsize,
}

impl MemoryVectors {
    pub(crate) fn fail_upserts_for(&self, chunk_index: u32) {
        self.fail_upserts_for
            .lock()
            .expect("lock")
            .insert(chunk_index);
    }

    pub(crate) fn clear_failures(&self) {
        self.fail_upserts_for.lock().expect("lock").clear();
        self.fail_ensure.store(false, Ordering::SeqCst);
        self.fail_deletes.store(false, Ordering::SeqCst);
    }

    pub(crate) fn fail_ensure(&self) {
        self.fail_ensure.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    pub(crate) fn delay_upserts(&self, delay: Duration) {
        *self.upsert_delay.lock().expect("lock") = Some(delay);
    }

    pub(crate) fn ensure_calls(&self) -> usize {
        self.ensure_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn width(&self, collection: &str) -> Option<usize> {
        self.collections
            .lock()
            .expect("lock")
            .get(collection)
            .map(|c| c.width)
    }

    pub(crate) fn points(&self, collection: &str) -> Vec<VectorPoint> {
        self.collections
            .lock()
            .expect("lock")
            .get(collection)
            .map(|c| c.points.values().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn has_collection(&self, collection: &str) -> bool {
        self.collections.lock().expect("lock").contains_key(collection)
    }

    /// Insert a point directly, bypassing width checks
    pub(crate) fn put_point(&self, collection: &str, point: VectorPoint) {
        let mut collections = self.collections.lock().expect("lock");
        let entry = collections
            .entry(collection.to_string())
            .or_insert_with(|| Collection {
                width: point.vector.len(),
                points: BTreeMap::new(),
            });
        entry.points.insert(point.id, point);
    }

    fn delete_where(&self, collection: &str, keep: impl Fn(&VectorPoint) -> bool) -> crate::Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(IngestError::Database("injected delete failure".to_string()));
        }
        let mut collections = self.collections.lock().expect("lock");
        if let Some(c) = collections.get_mut(collection) {
            c.points.retain(|_, point| keep(point));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for MemoryVectors {
    async fn ensure_collection(&self, collection: &str, width: usize) -> crate::Result<usize> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_ensure.load(Ordering::SeqCst) {
            return Err(IngestError::Database("injected provision failure".to_string()));
        }

        let mut collections = self.collections.lock().expect("lock");
        let entry = collections
            .entry(collection.to_string())
            .or_insert_with(|| Collection {
                width,
                points: BTreeMap::new(),
            });
        Ok(entry.width)
    }

    async fn upsert_point(&self, collection: &str, point: VectorPoint) -> crate::Result<()> {
        let delay = *self.upsert_delay.lock().expect("lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self
            .fail_upserts_for
            .lock()
            .expect("lock")
            .contains(&point.payload.chunk_index)
        {
            return Err(IngestError::Database("injected upsert failure".to_string()));
        }

        let mut collections = self.collections.lock().expect("lock");
        let Some(c) = collections.get_mut(collection) else {
            return Err(IngestError::Database(format!("no collection {}", collection)));
        };
        if point.vector.len() != c.width {
            return Err(IngestError::Database(format!(
                "width {} does not match {}",
                point.vector.len(),
                c.width
            )));
        }
        c.points.insert(point.id, point);
        Ok(())
    }

    async fn list_points(
        &self,
        collection: &str,
        configuration_id: Uuid,
    ) -> crate::Result<Vec<StoredPoint>> {
        Ok(self
            .points(collection)
            .into_iter()
            .filter(|point| point.payload.configuration_id == configuration_id)
            .map(|point| StoredPoint {
                id: point.id,
                chunk_id: point.payload.chunk_id.to_string(),
                chunk_index: point.payload.chunk_index,
                source_name: point.payload.source_name,
            })
            .collect())
    }

    async fn delete_points(&self, collection: &str, ids: &[u64]) -> crate::Result<()> {
        self.delete_where(collection, |point| !ids.contains(&point.id))
    }

    async fn delete_by_chunk(&self, collection: &str, chunk_id: Uuid) -> crate::Result<()> {
        self.delete_where(collection, |point| point.payload.chunk_id != chunk_id)
    }

    async fn delete_by_source(
        &self,
        collection: &str,
        configuration_id: Uuid,
        source_name: &str,
    ) -> crate::Result<()> {
        self.delete_where(collection, |point| {
            !(point.payload.configuration_id == configuration_id
                && point.payload.source_name == source_name)
        })
    }

    async fn delete_by_configuration(
        &self,
        collection: &str,
        configuration_id: Uuid,
    ) -> crate::Result<()> {
        self.delete_where(collection, |point| {
            point.payload.configuration_id != configuration_id
        })
    }

    async fn count(&self, collection: &str) -> crate::Result<usize> {
        Ok(self.points(collection).len())
    }
}

/// Always returns a vector of the given width
pub(crate) struct FixedWidthService(pub(crate) usize);

impl EmbeddingService for FixedWidthService {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let seed = text.len() as f32;
        Ok((0..self.0).map(|i| (seed + i as f32) / 1000.0).collect())
    }
}

/// Always fails, as an unreachable service would
pub(crate) struct UnreachableService;

impl EmbeddingService for UnreachableService {
    fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        Err(anyhow::anyhow!("connection refused"))
    }
}

/// Succeeds for the first `healthy_calls` calls, then fails
pub(crate) struct FlakyService {
    pub(crate) width: usize,
    pub(crate) healthy_calls: usize,
    pub(crate) calls: AtomicUsize,
}

impl EmbeddingService for FlakyService {
    fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.healthy_calls {
            Ok(vec![0.25; self.width])
        } else {
            Err(anyhow::anyhow!("service unavailable"))
        }
    }
}
