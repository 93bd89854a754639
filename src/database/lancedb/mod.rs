// LanceDB vector database module
// One table per collection, one row per chunk point


pub mod vector_store;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use vector_store::LanceVectorStore;

/// A point to write into a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: u64,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

/// Payload stored alongside each vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointPayload {
    /// Identity of the metadata row this point belongs to
    pub chunk_id: Uuid,
    pub chunk_index: u32,
    pub content: String,
    pub configuration_id: Uuid,
    pub source_name: String,
}

/// A point read back from a collection, without its vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPoint {
    pub id: u64,
    pub chunk_id: String,
    pub chunk_index: u32,
    pub source_name: String,
}

/// Quote a string literal for a LanceDB filter expression
pub(crate) fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub(crate) fn configuration_predicate(configuration_id: Uuid) -> String {
    format!(
        "configuration_id = {}",
        quote_literal(&configuration_id.to_string())
    )
}

pub(crate) fn source_predicate(configuration_id: Uuid, source_name: &str) -> String {
    format!(
        "{} AND source_name = {}",
        configuration_predicate(configuration_id),
        quote_literal(source_name)
    )
}

pub(crate) fn chunk_predicate(chunk_id: Uuid) -> String {
    format!("chunk_id = {}", quote_literal(&chunk_id.to_string()))
}

pub(crate) fn ids_predicate(ids: &[u64]) -> String {
    let list = ids
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("id IN ({})", list)
}
