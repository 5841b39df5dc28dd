// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Crash Recovery Integration Tests
//!
//! Each test fabricates the exact database state a crash would leave
//! behind (using only repository operations), then boots a fresh system
//! against the same database and asserts that recovery converges to a
//! terminal file with no duplicate records.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use granary::application::IngestSystem;
use granary::infrastructure::config::AppConfig;
use granary::infrastructure::io::{plan_chunks, read_rows_at};
use granary::infrastructure::repositories::{
    ensure_schema, initialize_database, SqliteIngestRepository,
};
use granary_domain::{
    ChunkMeta, ChunkSize, ChunkStatus, FileId, FileStatus, IngestRepository, ProcessedRecord,
    StoredFile,
};

fn test_config(dir: &TempDir, chunk_rows: u32) -> AppConfig {
    AppConfig {
        database_url: format!("sqlite://{}", dir.path().join("granary.db").display()),
        max_concurrency: 4,
        chunk_size: ChunkSize::new(chunk_rows).unwrap(),
        retry_policy: granary_domain::RetryPolicy::new(3, 0.01, 0.05).unwrap(),
        max_upload_mb: 10,
        allowed_content_types: vec!["text/csv".to_string()],
        delete_file_on_complete: false,
        disable_background: true,
        storage_dir: dir.path().join("uploads"),
        bind_addr: "127.0.0.1:0".to_string(),
    }
}

async fn sqlite_repository(config: &AppConfig) -> Arc<SqliteIngestRepository> {
    let pool = initialize_database(&config.database_url).await.unwrap();
    ensure_schema(&pool).await.unwrap();
    Arc::new(SqliteIngestRepository::new(pool))
}

async fn write_blob(dir: &TempDir, name: &str, rows: usize) -> String {
    let uploads = dir.path().join("uploads");
    tokio::fs::create_dir_all(&uploads).await.unwrap();
    let mut content = String::from("id,name\n");
    for i in 0..rows {
        content.push_str(&format!("{},row-{}\n", i, i));
    }
    let path = uploads.join(name);
    tokio::fs::write(&path, content).await.unwrap();
    path.to_string_lossy().into_owned()
}

fn boot_system(config: AppConfig, repository: Arc<SqliteIngestRepository>) -> IngestSystem {
    IngestSystem::builder(config)
        .repository(repository)
        .without_jitter()
        .build()
        .unwrap()
}

async fn wait_for_terminal(system: &IngestSystem, id: &FileId) -> StoredFile {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let file = system.repository.get_file(id).await.unwrap().unwrap();
        if file.status.is_terminal() {
            return file;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for terminal status, last seen: {:?}",
            file
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Crash shape: chunk 0 committed, chunk 1 claimed but never committed.
/// Recovery must reset chunk 1, re-run it, and not duplicate chunk 0's
/// records.
#[tokio::test]
async fn test_in_flight_chunk_is_reclaimed_without_duplicates() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, 5);
    let repository = sqlite_repository(&config).await;

    let blob = write_blob(&dir, "crash.csv", 8).await; // 2 chunks of (5, 3)
    let plan = plan_chunks(blob.as_ref(), ChunkSize::new(5).unwrap()).unwrap();
    assert_eq!(plan.len(), 2);

    let id = FileId::new();
    repository
        .create_file(&StoredFile::new(id.clone(), "crash.csv", &blob))
        .await
        .unwrap();
    repository.begin_processing(&id, 2).await.unwrap();
    for chunk in &plan {
        repository
            .create_chunk(&id, chunk.index, ChunkMeta::new(chunk.start_cookie, chunk.num_rows))
            .await
            .unwrap();
    }

    // Chunk 0 completed before the crash.
    assert!(repository.claim_chunk(&id, 0).await.unwrap());
    let rows = read_rows_at(blob.as_ref(), plan[0].start_cookie, plan[0].num_rows).unwrap();
    let records = rows
        .into_iter()
        .map(|fields| ProcessedRecord::from_row(id.clone(), 0, fields))
        .collect();
    repository.complete_chunk(&id, 0, records).await.unwrap();

    // Chunk 1 was in flight when the process died.
    assert!(repository.claim_chunk(&id, 1).await.unwrap());

    // "Restart": fresh queue, pool and lifecycle over the same database.
    let system = boot_system(config, repository);
    system.recover().await.unwrap();

    let file = wait_for_terminal(&system, &id).await;
    assert_eq!(file.status, FileStatus::Completed);
    assert_eq!(file.processed_chunks, 2);
    assert_eq!(file.failed_chunks, 0);

    let chunk1 = system.repository.get_chunk(&id, 1).await.unwrap().unwrap();
    assert_eq!(chunk1.status, ChunkStatus::Completed);

    // 8 data rows, exactly once each.
    assert_eq!(system.repository.count_records(&id).await.unwrap(), 8);

    system.shutdown().await;
}

/// Crash shape: the planner wrote the up-front total (5) but died after
/// persisting only 2 chunk rows. Recovery re-plans from scratch.
#[tokio::test]
async fn test_mid_scan_planner_crash_replans_from_scratch() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, 5);
    let repository = sqlite_repository(&config).await;

    let blob = write_blob(&dir, "midscan.csv", 23).await; // plans to 5 chunks
    let plan = plan_chunks(blob.as_ref(), ChunkSize::new(5).unwrap()).unwrap();
    assert_eq!(plan.len(), 5);

    let id = FileId::new();
    repository
        .create_file(&StoredFile::new(id.clone(), "midscan.csv", &blob))
        .await
        .unwrap();
    repository.begin_processing(&id, 5).await.unwrap();
    for chunk in plan.iter().take(2) {
        repository
            .create_chunk(&id, chunk.index, ChunkMeta::new(chunk.start_cookie, chunk.num_rows))
            .await
            .unwrap();
    }

    let system = boot_system(config, repository);
    system.recover().await.unwrap();

    let file = wait_for_terminal(&system, &id).await;
    assert_eq!(file.status, FileStatus::Completed);
    assert_eq!(file.total_chunks, 5);
    assert_eq!(file.processed_chunks, 5);
    assert_eq!(system.repository.chunk_count(&id).await.unwrap(), 5);
    assert_eq!(system.repository.count_records(&id).await.unwrap(), 23);

    system.shutdown().await;
}

/// Crash shape: the file was admitted but the planner never ran.
#[tokio::test]
async fn test_queued_file_is_planned_on_recovery() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, 5);
    let repository = sqlite_repository(&config).await;

    let blob = write_blob(&dir, "queued.csv", 7).await;
    let id = FileId::new();
    repository
        .create_file(&StoredFile::new(id.clone(), "queued.csv", &blob))
        .await
        .unwrap();

    let system = boot_system(config, repository);
    system.recover().await.unwrap();

    let file = wait_for_terminal(&system, &id).await;
    assert_eq!(file.status, FileStatus::Completed);
    assert_eq!(file.total_chunks, 2);
    assert_eq!(system.repository.count_records(&id).await.unwrap(), 7);

    system.shutdown().await;
}

/// Crash shape: every chunk terminated but the process died before the
/// finalizer ran. Recovery must close the gap without re-running anything.
#[tokio::test]
async fn test_finalization_gap_is_closed_on_recovery() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, 5);
    let repository = sqlite_repository(&config).await;

    let blob = write_blob(&dir, "gap.csv", 8).await;
    let plan = plan_chunks(blob.as_ref(), ChunkSize::new(5).unwrap()).unwrap();

    let id = FileId::new();
    repository
        .create_file(&StoredFile::new(id.clone(), "gap.csv", &blob))
        .await
        .unwrap();
    repository.begin_processing(&id, 2).await.unwrap();
    for chunk in &plan {
        repository
            .create_chunk(&id, chunk.index, ChunkMeta::new(chunk.start_cookie, chunk.num_rows))
            .await
            .unwrap();
        repository.claim_chunk(&id, chunk.index).await.unwrap();
        let rows = read_rows_at(blob.as_ref(), chunk.start_cookie, chunk.num_rows).unwrap();
        let records = rows
            .into_iter()
            .map(|fields| ProcessedRecord::from_row(id.clone(), chunk.index, fields))
            .collect();
        repository.complete_chunk(&id, chunk.index, records).await.unwrap();
    }

    // All chunks completed, file still 'processing'.
    let before = repository.get_file(&id).await.unwrap().unwrap();
    assert_eq!(before.status, FileStatus::Processing);
    assert_eq!(before.processed_chunks, 2);

    let record_count = repository.count_records(&id).await.unwrap();
    let system = boot_system(config, repository);
    system.recover().await.unwrap();

    let file = system.repository.get_file(&id).await.unwrap().unwrap();
    assert_eq!(file.status, FileStatus::Completed);
    // Nothing re-ran: record count unchanged.
    assert_eq!(system.repository.count_records(&id).await.unwrap(), record_count);

    system.shutdown().await;
}
