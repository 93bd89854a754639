use super::*;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;

async fn create_test_pool() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(&db_path)
                .create_if_missing(true),
        )
        .await
        .expect("Failed to create test pool");

    sqlx::raw_sql(include_str!("../migrations/001_knowledge_chunks.sql"))
        .execute(&pool)
        .await
        .expect("Failed to run migrations");

    (temp_dir, pool)
}

fn chunk(configuration_id: Uuid, source: &str, index: u32, total: u32) -> KnowledgeChunk {
    KnowledgeChunk::new(
        configuration_id,
        source,
        index,
        total,
        format!("chunk {} of {}", index, source),
    )
}

#[tokio::test]
async fn chunk_crud_operations() {
    let (_temp_dir, pool) = create_test_pool().await;
    let configuration_id = Uuid::new_v4();

    let mut new_chunk = chunk(configuration_id, "guide.pdf", 0, 1);
    KnowledgeChunkQueries::insert(&pool, &new_chunk)
        .await
        .expect("Failed to insert chunk");

    let retrieved = KnowledgeChunkQueries::get_by_id(&pool, new_chunk.id)
        .await
        .expect("Failed to get chunk")
        .expect("Chunk should exist");
    assert_eq!(retrieved.source_name, "guide.pdf");
    assert_eq!(retrieved.page_number, 1);
    assert_eq!(retrieved.status, ChunkSyncStatus::Pending);
    assert!(retrieved.metadata.is_empty());

    new_chunk.mark_indexed(99);
    let updated = KnowledgeChunkQueries::update(&pool, &new_chunk)
        .await
        .expect("Failed to update chunk");
    assert!(updated);

    let retrieved = KnowledgeChunkQueries::get_by_id(&pool, new_chunk.id)
        .await
        .expect("Failed to get chunk")
        .expect("Chunk should exist");
    assert_eq!(retrieved.status, ChunkSyncStatus::Indexed);
    assert_eq!(retrieved.point_id(), Some(99));
}

#[tokio::test]
async fn update_missing_row_reports_false() {
    let (_temp_dir, pool) = create_test_pool().await;

    let missing = chunk(Uuid::new_v4(), "ghost.docx", 0, 1);
    let updated = KnowledgeChunkQueries::update(&pool, &missing)
        .await
        .expect("Update should not error");

    assert!(!updated);
}

#[tokio::test]
async fn duplicate_ordinal_is_rejected() {
    let (_temp_dir, pool) = create_test_pool().await;
    let configuration_id = Uuid::new_v4();

    KnowledgeChunkQueries::insert(&pool, &chunk(configuration_id, "a.pdf", 0, 2))
        .await
        .expect("first insert should succeed");

    let duplicate = KnowledgeChunkQueries::insert(&pool, &chunk(configuration_id, "a.pdf", 0, 2)).await;
    assert!(duplicate.is_err());

    // Same ordinal under another configuration is a different chunk
    KnowledgeChunkQueries::insert(&pool, &chunk(Uuid::new_v4(), "a.pdf", 0, 2))
        .await
        .expect("insert under another configuration should succeed");
}

#[tokio::test]
async fn listing_is_ordered_by_ordinal() {
    let (_temp_dir, pool) = create_test_pool().await;
    let configuration_id = Uuid::new_v4();

    for index in [2, 0, 1] {
        KnowledgeChunkQueries::insert(&pool, &chunk(configuration_id, "book.docx", index, 3))
            .await
            .expect("Failed to insert chunk");
    }
    KnowledgeChunkQueries::insert(&pool, &chunk(configuration_id, "other.pdf", 0, 1))
        .await
        .expect("Failed to insert chunk");

    let chunks = KnowledgeChunkQueries::list_by_source(&pool, configuration_id, "book.docx")
        .await
        .expect("Failed to list chunks");
    let ordinals: Vec<u32> = chunks.iter().map(|c| c.chunk_index).collect();
    assert_eq!(ordinals, vec![0, 1, 2]);

    let all = KnowledgeChunkQueries::list_by_configuration(&pool, configuration_id)
        .await
        .expect("Failed to list configuration");
    assert_eq!(all.len(), 4);

    let pending = KnowledgeChunkQueries::list_pending(&pool)
        .await
        .expect("Failed to list pending");
    assert_eq!(pending.len(), 4);
}

#[tokio::test]
async fn deletes_are_scoped() {
    let (_temp_dir, pool) = create_test_pool().await;
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    for index in 0..3 {
        KnowledgeChunkQueries::insert(&pool, &chunk(first, "a.pdf", index, 3))
            .await
            .expect("Failed to insert chunk");
    }
    KnowledgeChunkQueries::insert(&pool, &chunk(first, "b.pdf", 0, 1))
        .await
        .expect("Failed to insert chunk");
    KnowledgeChunkQueries::insert(&pool, &chunk(second, "a.pdf", 0, 1))
        .await
        .expect("Failed to insert chunk");

    let deleted = KnowledgeChunkQueries::delete_by_source(&pool, first, "a.pdf")
        .await
        .expect("Failed to delete source");
    assert_eq!(deleted, 3);

    let configurations = KnowledgeChunkQueries::list_configurations(&pool)
        .await
        .expect("Failed to list configurations");
    assert_eq!(configurations.len(), 2);

    let deleted = KnowledgeChunkQueries::delete_by_configuration(&pool, first)
        .await
        .expect("Failed to delete configuration");
    assert_eq!(deleted, 1);

    let remaining = KnowledgeChunkQueries::list_by_configuration(&pool, second)
        .await
        .expect("Failed to list configuration");
    assert_eq!(remaining.len(), 1);
}
