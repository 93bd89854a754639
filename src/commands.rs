use anyhow::{Context, Result};
use console::style;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::IngestError;
use crate::config::Config;
use crate::database::{Database, LanceVectorStore, MetadataStore, VectorIndex};
use crate::ingest::{ChunkStatus, IngestReport, IngestRequest, IngestionCoordinator};

/// Both stores opened from one configuration
struct Stores {
    database: Database,
    vectors: Arc<LanceVectorStore>,
}

impl Stores {
    async fn open(config: &Config) -> Result<Self> {
        let database = Database::initialize_from_config_dir(config.get_base_dir())
            .await
            .context("Failed to initialize database")?;
        let vectors = LanceVectorStore::from_config(config)
            .await
            .context("Failed to open vector database")?;

        Ok(Self {
            database,
            vectors: Arc::new(vectors),
        })
    }

    fn coordinator(&self, config: &Config) -> Result<IngestionCoordinator> {
        let metadata: Arc<dyn MetadataStore> = Arc::new(self.database.clone());
        let vectors: Arc<dyn VectorIndex> = Arc::clone(&self.vectors) as Arc<dyn VectorIndex>;
        IngestionCoordinator::from_config(config, metadata, vectors)
            .context("Failed to set up ingestion")
    }
}

fn collection_or_default<'a>(config: &'a Config, collection: Option<&'a str>) -> &'a str {
    collection.unwrap_or(&config.ingestion.default_collection)
}

/// Ingest one document file
#[inline]
pub async fn ingest_file(
    config: &Config,
    path: &Path,
    configuration_id: Uuid,
    collection: Option<&str>,
    retry: Option<Vec<usize>>,
) -> Result<()> {
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow::anyhow!("Not a file path: {}", path.display()))?;
    let document = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let collection = collection_or_default(config, collection);
    let stores = Stores::open(config).await?;
    let coordinator = stores.coordinator(config)?;

    let mut request = IngestRequest::new(document, filename.clone(), collection, configuration_id);
    if let Some(ordinals) = retry {
        info!("Retrying ordinals {:?} of {}", ordinals, filename);
        request = request.with_ordinals(ordinals);
    }

    match coordinator.ingest(request).await {
        Ok(report) => {
            print_report(&report);
            if !report.is_complete() {
                anyhow::bail!(
                    "{} chunks failed; retry with --retry {}",
                    report.failures.len(),
                    join_ordinals(&report.failed_ordinals())
                );
            }
            Ok(())
        }
        Err(IngestError::ChunkFailed {
            document,
            ordinal,
            source,
            completed,
        }) => {
            println!(
                "{} {} aborted at chunk {}: {}",
                style("✗").red(),
                document,
                ordinal,
                source
            );
            println!("  Points written before abort: {}", completed.len());
            anyhow::bail!("Ingestion aborted; retry with --retry {}", ordinal)
        }
        Err(e) => Err(e.into()),
    }
}

fn print_report(report: &IngestReport) {
    let marker = if report.is_complete() {
        style("✓").green()
    } else {
        style("⚠").yellow()
    };

    println!(
        "{} {} → {} ({} dimensions)",
        marker,
        style(&report.document).bold(),
        style(&report.collection).cyan(),
        report.vector_width
    );
    println!("  Configuration: {}", report.configuration_id);
    println!("  Total chunks: {}", report.total_chunks);
    println!("  Points: {}", report.points.len());

    if !report.skipped_ordinals.is_empty() {
        println!(
            "  Unchanged (skipped): {}",
            join_ordinals(&report.skipped_ordinals)
        );
    }
    if !report.degraded_ordinals.is_empty() {
        println!(
            "  {} {}",
            style("Fallback vectors:").yellow(),
            join_ordinals(&report.degraded_ordinals)
        );
    }
    for failure in &report.failures {
        println!(
            "  {} chunk {} ({:?}): {}",
            style("Failed").red(),
            failure.ordinal,
            report
                .outcomes
                .get(&failure.ordinal)
                .copied()
                .unwrap_or(ChunkStatus::NotPersisted),
            failure.error
        );
    }
}

fn join_ordinals(ordinals: &[usize]) -> String {
    ordinals
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Delete one source's points and rows
#[inline]
pub async fn delete_source(
    config: &Config,
    configuration_id: Uuid,
    source_name: &str,
    collection: Option<&str>,
) -> Result<()> {
    let collection = collection_or_default(config, collection);
    let stores = Stores::open(config).await?;
    let coordinator = stores.coordinator(config)?;

    let deleted = coordinator
        .delete_source(configuration_id, source_name, collection)
        .await?;

    if deleted == 0 {
        println!("No chunks found for {}", source_name);
    } else {
        println!(
            "{} Deleted {} chunks of {}",
            style("✓").green(),
            deleted,
            source_name
        );
    }
    Ok(())
}

/// Delete everything ingested for a configuration
#[inline]
pub async fn delete_configuration(
    config: &Config,
    configuration_id: Uuid,
    collection: Option<&str>,
) -> Result<()> {
    let collection = collection_or_default(config, collection);
    let stores = Stores::open(config).await?;
    let coordinator = stores.coordinator(config)?;

    let deleted = coordinator
        .delete_configuration(configuration_id, collection)
        .await?;

    println!(
        "{} Deleted {} chunks of configuration {}",
        style("✓").green(),
        deleted,
        configuration_id
    );
    Ok(())
}

/// Compare metadata rows with vector points, optionally removing orphans.
/// Checks every known configuration when none is given.
#[inline]
pub async fn check_consistency(
    config: &Config,
    configuration_id: Option<Uuid>,
    collection: Option<&str>,
    cleanup: bool,
) -> Result<()> {
    let collection = collection_or_default(config, collection);
    let stores = Stores::open(config).await?;
    let coordinator = stores.coordinator(config)?;
    let validator = coordinator.validator();

    let configurations = match configuration_id {
        Some(id) => vec![id],
        None => stores.database.configurations().await?,
    };

    if configurations.is_empty() {
        println!("Nothing has been ingested yet.");
        return Ok(());
    }

    let mut inconsistent = 0;
    let mut removed_any = false;
    for configuration_id in configurations {
        let report = validator
            .validate_consistency(configuration_id, collection)
            .await?;

        println!("{}", style(format!("Configuration {}", configuration_id)).bold());
        println!("  Metadata rows: {}", report.metadata_rows);
        println!("  Vector points: {}", report.vector_points);

        if report.is_consistent {
            println!("  {} Consistent", style("✓").green());
            continue;
        }
        inconsistent += 1;

        if !report.missing_points.is_empty() {
            println!(
                "  {} {} rows have no point",
                style("⚠").yellow(),
                report.missing_points.len()
            );
            for source in report.sources_needing_retry() {
                println!("    re-ingest {}", source);
            }
        }
        if !report.provenance_mismatches.is_empty() {
            println!(
                "  {} {} rows point at another chunk's vector",
                style("⚠").yellow(),
                report.provenance_mismatches.len()
            );
        }
        if !report.orphaned_points.is_empty() {
            println!(
                "  {} {} orphaned points",
                style("⚠").yellow(),
                report.orphaned_points.len()
            );
            if cleanup {
                let removed = validator
                    .cleanup_orphaned_points(collection, &report.orphaned_points)
                    .await?;
                println!("  {} Removed {} orphaned points", style("✓").green(), removed);
                removed_any = true;
            }
        }
        println!();
    }

    if removed_any {
        stores.vectors.optimize(collection).await?;
    }
    if inconsistent > 0 {
        warn!("{} configurations have consistency issues", inconsistent);
    }
    Ok(())
}

/// Print the effective configuration
#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", style("📋 Current Configuration").bold().cyan());
    println!();

    println!("{}", style("Embedding Service:").bold().yellow());
    match config.embedding.service_url() {
        Ok(url) => println!("  URL: {}", style(url).cyan()),
        Err(e) => println!("  URL: {} ({})", style("Invalid").red(), e),
    }
    println!("  Max length: {}", style(config.embedding.max_length).cyan());
    println!(
        "  Timeout: {}s",
        style(config.embedding.timeout_seconds).cyan()
    );
    println!(
        "  Max attempts: {}",
        style(config.embedding.max_attempts).cyan()
    );
    println!(
        "  Fallback dimension: {}",
        style(config.embedding.fallback_dimension).cyan()
    );

    println!();
    println!("{}", style("Chunking:").bold().yellow());
    println!("  Max words: {}", style(config.chunking.max_words).cyan());

    println!();
    println!("{}", style("Retrieval:").bold().yellow());
    println!("  Top K: {}", style(config.rag_top_k()).cyan());

    println!();
    println!("{}", style("Ingestion:").bold().yellow());
    println!(
        "  Failure policy: {}",
        style(config.ingestion.failure_policy).cyan()
    );
    println!(
        "  Concurrent chunks: {}",
        style(config.ingestion.max_concurrent_chunks).cyan()
    );
    println!(
        "  Store timeout: {}s",
        style(config.ingestion.store_timeout_seconds).cyan()
    );
    println!(
        "  Default collection: {}",
        style(&config.ingestion.default_collection).cyan()
    );

    println!();
    println!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

/// Write the configuration file, creating it with defaults if absent
#[inline]
pub fn write_config(config: &Config) -> Result<()> {
    let path = config.config_file_path();
    let existed = path.exists();
    config.save()?;

    if existed {
        println!("{} Configuration saved to {}", style("✓").green(), path.display());
    } else {
        println!(
            "{} Wrote default configuration to {}",
            style("✓").green(),
            path.display()
        );
    }
    Ok(())
}

/// Load configuration from `config_dir`, or the default directory
#[inline]
pub fn load_config(config_dir: Option<&Path>) -> Result<Config> {
    let dir = match config_dir {
        Some(dir) => dir.to_path_buf(),
        None => Config::config_dir()?,
    };
    Config::load(&dir).context("Failed to load configuration")
}
