
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// Source type recorded for uploaded documents
pub const FILE_SOURCE_TYPE: &str = "file";

/// One chunk of an ingested source, as stored in the metadata database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct KnowledgeChunk {
    pub id: Uuid,
    /// The RAG configuration this chunk belongs to
    pub configuration_id: Uuid,
    pub source_type: String,
    pub source_name: String,
    /// 0-based, dense within (configuration, source)
    pub chunk_index: u32,
    pub total_chunks: u32,
    /// Always `chunk_index + 1`
    pub page_number: u32,
    pub content: String,
    /// Vector point identifier once the point has been written
    pub metadata: String,
    pub status: ChunkSyncStatus,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChunkSyncStatus {
    /// Row committed, no vector point recorded yet
    Pending,
    /// Vector point written and its identifier stored in `metadata`
    Indexed,
}

impl std::fmt::Display for ChunkSyncStatus {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            ChunkSyncStatus::Pending => write!(f, "Pending"),
            ChunkSyncStatus::Indexed => write!(f, "Indexed"),
        }
    }
}

impl KnowledgeChunk {
    /// A fresh pending row for chunk `chunk_index` of `total_chunks`
    #[inline]
    pub fn new(
        configuration_id: Uuid,
        source_name: &str,
        chunk_index: u32,
        total_chunks: u32,
        content: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            configuration_id,
            source_type: FILE_SOURCE_TYPE.to_string(),
            source_name: source_name.to_string(),
            chunk_index,
            total_chunks,
            page_number: chunk_index + 1,
            content,
            metadata: String::new(),
            status: ChunkSyncStatus::Pending,
            created_date: now,
            updated_date: now,
        }
    }

    #[inline]
    pub fn is_indexed(&self) -> bool {
        self.status == ChunkSyncStatus::Indexed
    }

    /// The vector point recorded for this chunk, if any
    #[inline]
    pub fn point_id(&self) -> Option<u64> {
        if self.is_indexed() {
            self.metadata.parse().ok()
        } else {
            None
        }
    }

    /// Record the vector point written for this chunk
    #[inline]
    pub fn mark_indexed(&mut self, point_id: u64) {
        self.metadata = point_id.to_string();
        self.status = ChunkSyncStatus::Indexed;
        self.updated_date = Utc::now();
    }

    /// Replace the chunk text and return the row to pending
    #[inline]
    pub fn reset_content(&mut self, content: String) {
        self.content = content;
        self.metadata.clear();
        self.status = ChunkSyncStatus::Pending;
        self.updated_date = Utc::now();
    }
}
