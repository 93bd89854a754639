// Cross-store consistency validation
// Compares a configuration's metadata rows with the points in its collection


use std::collections::{HashMap, HashSet};

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::database::{ChunkSyncStatus, MetadataStore, StoredPoint, VectorIndex};
use crate::{IngestError, Result};

/// Consistency check results for one configuration and collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub configuration_id: Uuid,
    pub collection: String,
    /// Number of metadata rows for the configuration
    pub metadata_rows: usize,
    /// Number of points for the configuration in the collection
    pub vector_points: usize,
    /// Rows with no point: pending rows, or indexed rows whose point is gone
    pub missing_points: Vec<MissingPoint>,
    /// Point ids that no indexed row records
    pub orphaned_points: Vec<u64>,
    /// Rows whose recorded point carries another chunk's identity
    pub provenance_mismatches: Vec<ProvenanceMismatch>,
    pub is_consistent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingPoint {
    pub chunk_id: Uuid,
    pub source_name: String,
    pub chunk_index: u32,
    pub status: ChunkSyncStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceMismatch {
    pub chunk_id: Uuid,
    pub point_id: u64,
    pub point_chunk_id: String,
}

impl ConsistencyReport {
    /// Sources with at least one chunk to re-ingest
    #[inline]
    pub fn sources_needing_retry(&self) -> Vec<String> {
        let mut sources: Vec<String> = self
            .missing_points
            .iter()
            .map(|missing| missing.source_name.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        sources.sort();
        sources
    }
}

/// Performs consistency validation between the metadata store and the vector index
pub struct ConsistencyValidator<'a> {
    metadata: &'a dyn MetadataStore,
    vectors: &'a dyn VectorIndex,
}

impl<'a> ConsistencyValidator<'a> {
    #[inline]
    pub fn new(metadata: &'a dyn MetadataStore, vectors: &'a dyn VectorIndex) -> Self {
        Self { metadata, vectors }
    }

    /// Check one configuration's rows against its points in `collection`.
    ///
    /// Run this while no ingestion is writing to the configuration: in-flight
    /// chunks show up as missing or orphaned.
    #[inline]
    pub async fn validate_consistency(
        &self,
        configuration_id: Uuid,
        collection: &str,
    ) -> Result<ConsistencyReport> {
        info!(
            "Starting consistency validation for configuration {} in {}",
            configuration_id, collection
        );

        let rows = self
            .metadata
            .chunks_for_configuration(configuration_id)
            .await
            .map_err(|e| IngestError::Database(format!("{:#}", e)))?;
        debug!("Found {} metadata rows", rows.len());

        let points = self.vectors.list_points(collection, configuration_id).await?;
        debug!("Found {} vector points", points.len());

        let points_by_id: HashMap<u64, &StoredPoint> =
            points.iter().map(|point| (point.id, point)).collect();

        let mut missing_points = Vec::new();
        let mut provenance_mismatches = Vec::new();
        let mut recorded_ids = HashSet::new();

        for row in &rows {
            let Some(point_id) = row.point_id() else {
                missing_points.push(MissingPoint {
                    chunk_id: row.id,
                    source_name: row.source_name.clone(),
                    chunk_index: row.chunk_index,
                    status: row.status,
                });
                continue;
            };
            recorded_ids.insert(point_id);

            match points_by_id.get(&point_id) {
                None => missing_points.push(MissingPoint {
                    chunk_id: row.id,
                    source_name: row.source_name.clone(),
                    chunk_index: row.chunk_index,
                    status: row.status,
                }),
                Some(point) if point.chunk_id != row.id.to_string() => {
                    provenance_mismatches.push(ProvenanceMismatch {
                        chunk_id: row.id,
                        point_id,
                        point_chunk_id: point.chunk_id.clone(),
                    });
                }
                Some(_) => {}
            }
        }

        let mut orphaned_points: Vec<u64> = points
            .iter()
            .map(|point| point.id)
            .filter(|id| !recorded_ids.contains(id))
            .collect();
        orphaned_points.sort_unstable();

        let is_consistent = missing_points.is_empty()
            && orphaned_points.is_empty()
            && provenance_mismatches.is_empty();

        let report = ConsistencyReport {
            configuration_id,
            collection: collection.to_string(),
            metadata_rows: rows.len(),
            vector_points: points.len(),
            missing_points,
            orphaned_points,
            provenance_mismatches,
            is_consistent,
        };

        if report.is_consistent {
            info!("Consistency validation passed");
        } else {
            warn!("Consistency validation found issues");
            Self::log_consistency_issues(&report);
        }

        Ok(report)
    }

    /// Delete points that no metadata row records
    #[inline]
    pub async fn cleanup_orphaned_points(
        &self,
        collection: &str,
        point_ids: &[u64],
    ) -> Result<usize> {
        if point_ids.is_empty() {
            return Ok(0);
        }

        info!(
            "Cleaning up {} orphaned points from {}",
            point_ids.len(),
            collection
        );

        if let Err(e) = self.vectors.delete_points(collection, point_ids).await {
            error!("Failed to delete orphaned points: {}", e);
            return Err(e);
        }

        info!("Cleaned up {} orphaned points", point_ids.len());
        Ok(point_ids.len())
    }

    fn log_consistency_issues(report: &ConsistencyReport) {
        if !report.missing_points.is_empty() {
            warn!(
                "{} rows have no vector point",
                report.missing_points.len()
            );
            for missing in report.missing_points.iter().take(10) {
                debug!(
                    "  {} #{} ({})",
                    missing.source_name, missing.chunk_index, missing.status
                );
            }
        }

        if !report.orphaned_points.is_empty() {
            warn!(
                "{} points have no metadata row",
                report.orphaned_points.len()
            );
            for point_id in report.orphaned_points.iter().take(10) {
                debug!("  orphaned point {}", point_id);
            }
        }

        for mismatch in &report.provenance_mismatches {
            warn!(
                "Chunk {} records point {} which belongs to chunk {}",
                mismatch.chunk_id, mismatch.point_id, mismatch.point_chunk_id
            );
        }
    }
}
