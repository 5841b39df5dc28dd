// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQLite Ingest Repository
//!
//! SQLite implementation of the persistence gateway. Every durable
//! transition is a single transaction; file counters are advanced with
//! atomic SQL increments so concurrent worker commits never lose updates.
//!
//! ## Transactional shape of the hot operations
//!
//! - `claim_chunk`: one conditional `UPDATE ... WHERE status = 'queued'`;
//!   the row count tells the caller whether it won the claim.
//! - `complete_chunk`: one transaction covering the record inserts, the
//!   `processing → completed` transition and the `processed_chunks`
//!   increment. A crash leaves either nothing or everything.
//! - `finalize_file_if_done`: one conditional `UPDATE` whose `CASE`
//!   expression picks the terminal status; the guard clause makes it a
//!   no-op unless every planned chunk has terminated.
//!
//! ## Busy-database retry
//!
//! SQLite surfaces write contention as `database is locked`/`busy`
//! errors. Write operations retry a bounded number of times with short
//! exponential backoff before surfacing `IngestError::Database` to the
//! executor, which then applies its own chunk-level retry policy.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::time::Duration;
use tracing::{debug, warn};

use granary_domain::{
    Chunk, ChunkMeta, ChunkStatus, FileId, FileStatus, IngestError, IngestRepository,
    ProcessedRecord, StoredFile,
};

/// Attempts for one write call against a busy database
const MAX_WRITE_ATTEMPTS: u32 = 5;

/// Base delay between busy-database retries
const WRITE_RETRY_BASE: Duration = Duration::from_millis(100);

/// Persistence gateway over a SQLite pool.
pub struct SqliteIngestRepository {
    pool: SqlitePool,
}

impl SqliteIngestRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for schema bootstrap and tests
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn now() -> String {
        Utc::now().to_rfc3339()
    }

    /// Whether an error is worth retrying inside the same call
    fn is_retryable(error: &sqlx::Error) -> bool {
        match error {
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
            sqlx::Error::Database(db) => {
                let message = db.message().to_ascii_lowercase();
                message.contains("locked") || message.contains("busy")
            }
            _ => false,
        }
    }

    fn db_err(context: &str, error: sqlx::Error) -> IngestError {
        IngestError::Database(format!("{}: {}", context, error))
    }
}

/// Retries a write closure on busy/locked errors with short exponential
/// backoff, then surfaces the last error.
macro_rules! with_write_retry {
    ($op_name:literal, $body:expr) => {{
        let mut attempt: u32 = 0;
        loop {
            match $body.await {
                Ok(value) => break Ok(value),
                Err(error) if Self::is_retryable(&error) && attempt + 1 < MAX_WRITE_ATTEMPTS => {
                    attempt += 1;
                    let delay = WRITE_RETRY_BASE * 2u32.saturating_pow(attempt - 1);
                    warn!(
                        op = $op_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "database busy, retrying write"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => break Err(Self::db_err($op_name, error)),
            }
        }
    }};
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, IngestError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| IngestError::Serialization(format!("Invalid timestamp '{}': {}", raw, e)))
}

fn to_u32(value: i64, column: &str) -> Result<u32, IngestError> {
    u32::try_from(value)
        .map_err(|_| IngestError::Serialization(format!("Column {} out of range: {}", column, value)))
}

fn file_from_row(row: &SqliteRow) -> Result<StoredFile, IngestError> {
    let id: String = row
        .try_get("id")
        .map_err(|e| IngestError::Serialization(e.to_string()))?;
    let status: String = row
        .try_get("status")
        .map_err(|e| IngestError::Serialization(e.to_string()))?;
    let created_at: String = row
        .try_get("created_at")
        .map_err(|e| IngestError::Serialization(e.to_string()))?;
    let updated_at: String = row
        .try_get("updated_at")
        .map_err(|e| IngestError::Serialization(e.to_string()))?;

    Ok(StoredFile {
        id: FileId::parse(&id)?,
        filename: row
            .try_get("filename")
            .map_err(|e| IngestError::Serialization(e.to_string()))?,
        path: row
            .try_get("path")
            .map_err(|e| IngestError::Serialization(e.to_string()))?,
        status: FileStatus::parse(&status)?,
        total_chunks: to_u32(
            row.try_get("total_chunks")
                .map_err(|e| IngestError::Serialization(e.to_string()))?,
            "total_chunks",
        )?,
        processed_chunks: to_u32(
            row.try_get("processed_chunks")
                .map_err(|e| IngestError::Serialization(e.to_string()))?,
            "processed_chunks",
        )?,
        failed_chunks: to_u32(
            row.try_get("failed_chunks")
                .map_err(|e| IngestError::Serialization(e.to_string()))?,
            "failed_chunks",
        )?,
        error_message: row
            .try_get("error_message")
            .map_err(|e| IngestError::Serialization(e.to_string()))?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn chunk_from_row(row: &SqliteRow) -> Result<Chunk, IngestError> {
    let file_id: String = row
        .try_get("file_id")
        .map_err(|e| IngestError::Serialization(e.to_string()))?;
    let status: String = row
        .try_get("status")
        .map_err(|e| IngestError::Serialization(e.to_string()))?;
    let meta_json: String = row
        .try_get("result_meta")
        .map_err(|e| IngestError::Serialization(e.to_string()))?;
    let created_at: String = row
        .try_get("created_at")
        .map_err(|e| IngestError::Serialization(e.to_string()))?;
    let updated_at: String = row
        .try_get("updated_at")
        .map_err(|e| IngestError::Serialization(e.to_string()))?;

    Ok(Chunk {
        id: row
            .try_get("id")
            .map_err(|e| IngestError::Serialization(e.to_string()))?,
        file_id: FileId::parse(&file_id)?,
        index: to_u32(
            row.try_get("chunk_index")
                .map_err(|e| IngestError::Serialization(e.to_string()))?,
            "chunk_index",
        )?,
        status: ChunkStatus::parse(&status)?,
        attempts: to_u32(
            row.try_get("attempts")
                .map_err(|e| IngestError::Serialization(e.to_string()))?,
            "attempts",
        )?,
        meta: serde_json::from_str::<ChunkMeta>(&meta_json)?,
        error_message: row
            .try_get("error_message")
            .map_err(|e| IngestError::Serialization(e.to_string()))?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn record_from_row(row: &SqliteRow) -> Result<ProcessedRecord, IngestError> {
    let file_id: String = row
        .try_get("file_id")
        .map_err(|e| IngestError::Serialization(e.to_string()))?;
    let data: String = row
        .try_get("data")
        .map_err(|e| IngestError::Serialization(e.to_string()))?;
    let created_at: String = row
        .try_get("created_at")
        .map_err(|e| IngestError::Serialization(e.to_string()))?;

    Ok(ProcessedRecord {
        id: row
            .try_get("id")
            .map_err(|e| IngestError::Serialization(e.to_string()))?,
        file_id: FileId::parse(&file_id)?,
        chunk_index: to_u32(
            row.try_get("chunk_index")
                .map_err(|e| IngestError::Serialization(e.to_string()))?,
            "chunk_index",
        )?,
        data: serde_json::from_str(&data)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

#[async_trait]
impl IngestRepository for SqliteIngestRepository {
    async fn create_file(&self, file: &StoredFile) -> Result<(), IngestError> {
        with_write_retry!("create_file", async {
            sqlx::query(
                "INSERT INTO files \
                 (id, filename, path, status, total_chunks, processed_chunks, failed_chunks, \
                  error_message, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(file.id.as_str())
            .bind(&file.filename)
            .bind(&file.path)
            .bind(file.status.as_str())
            .bind(i64::from(file.total_chunks))
            .bind(i64::from(file.processed_chunks))
            .bind(i64::from(file.failed_chunks))
            .bind(&file.error_message)
            .bind(file.created_at.to_rfc3339())
            .bind(file.updated_at.to_rfc3339())
            .execute(&self.pool)
            .await
        })?;
        Ok(())
    }

    async fn get_file(&self, id: &FileId) -> Result<Option<StoredFile>, IngestError> {
        let row = sqlx::query("SELECT * FROM files WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::db_err("get_file", e))?;

        row.as_ref().map(file_from_row).transpose()
    }

    async fn update_file(&self, file: &StoredFile) -> Result<(), IngestError> {
        with_write_retry!("update_file", async {
            sqlx::query(
                "UPDATE files SET filename = ?, path = ?, status = ?, error_message = ?, \
                 updated_at = ? WHERE id = ?",
            )
            .bind(&file.filename)
            .bind(&file.path)
            .bind(file.status.as_str())
            .bind(&file.error_message)
            .bind(Self::now())
            .bind(file.id.as_str())
            .execute(&self.pool)
            .await
        })?;
        Ok(())
    }

    async fn mark_file_failed(&self, id: &FileId, reason: &str) -> Result<(), IngestError> {
        with_write_retry!("mark_file_failed", async {
            sqlx::query(
                "UPDATE files SET status = 'failed', error_message = ?, updated_at = ? \
                 WHERE id = ? AND status NOT IN ('completed', 'completed_with_errors', 'failed')",
            )
            .bind(reason)
            .bind(Self::now())
            .bind(id.as_str())
            .execute(&self.pool)
            .await
        })?;
        Ok(())
    }

    async fn begin_processing(&self, id: &FileId, total_chunks: u32) -> Result<bool, IngestError> {
        let result = with_write_retry!("begin_processing", async {
            sqlx::query(
                "UPDATE files SET status = 'processing', total_chunks = ?, updated_at = ? \
                 WHERE id = ? AND status = 'queued'",
            )
            .bind(i64::from(total_chunks))
            .bind(Self::now())
            .bind(id.as_str())
            .execute(&self.pool)
            .await
        })?;
        Ok(result.rows_affected() == 1)
    }

    async fn create_chunk(
        &self,
        file_id: &FileId,
        index: u32,
        meta: ChunkMeta,
    ) -> Result<(), IngestError> {
        let meta_json = serde_json::to_string(&meta)?;
        with_write_retry!("create_chunk", async {
            let mut tx = self.pool.begin().await?;
            let now = Self::now();
            sqlx::query(
                "INSERT INTO chunks \
                 (id, file_id, chunk_index, status, attempts, result_meta, created_at, updated_at) \
                 VALUES (?, ?, ?, 'queued', 0, ?, ?, ?)",
            )
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(file_id.as_str())
            .bind(i64::from(index))
            .bind(&meta_json)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
            // total_chunks is non-decreasing; the up-front estimate already
            // covers this index in the common case.
            sqlx::query(
                "UPDATE files SET total_chunks = MAX(total_chunks, ?), updated_at = ? \
                 WHERE id = ?",
            )
            .bind(i64::from(index) + 1)
            .bind(&now)
            .bind(file_id.as_str())
            .execute(&mut *tx)
            .await?;
            tx.commit().await
        })?;
        Ok(())
    }

    async fn claim_chunk(&self, file_id: &FileId, index: u32) -> Result<bool, IngestError> {
        let result = with_write_retry!("claim_chunk", async {
            sqlx::query(
                "UPDATE chunks SET status = 'processing', updated_at = ? \
                 WHERE file_id = ? AND chunk_index = ? AND status = 'queued'",
            )
            .bind(Self::now())
            .bind(file_id.as_str())
            .bind(i64::from(index))
            .execute(&self.pool)
            .await
        })?;
        Ok(result.rows_affected() == 1)
    }

    async fn complete_chunk(
        &self,
        file_id: &FileId,
        index: u32,
        records: Vec<ProcessedRecord>,
    ) -> Result<(), IngestError> {
        // Serialize payloads before entering the retry loop; the records
        // themselves are reused across attempts.
        let payloads: Vec<(String, String, String)> = records
            .iter()
            .map(|record| {
                (
                    record.id.clone(),
                    record.data.to_string(),
                    record.created_at.to_rfc3339(),
                )
            })
            .collect();

        with_write_retry!("complete_chunk", async {
            let mut tx = self.pool.begin().await?;
            let now = Self::now();
            for (record_id, data, created_at) in &payloads {
                sqlx::query(
                    "INSERT INTO processed_records (id, file_id, chunk_index, data, created_at) \
                     VALUES (?, ?, ?, ?, ?)",
                )
                .bind(record_id)
                .bind(file_id.as_str())
                .bind(i64::from(index))
                .bind(data)
                .bind(created_at)
                .execute(&mut *tx)
                .await?;
            }

            let updated = sqlx::query(
                "UPDATE chunks SET status = 'completed', error_message = NULL, updated_at = ? \
                 WHERE file_id = ? AND chunk_index = ? AND status = 'processing'",
            )
            .bind(&now)
            .bind(file_id.as_str())
            .bind(i64::from(index))
            .execute(&mut *tx)
            .await?;
            if updated.rows_affected() != 1 {
                // The chunk was not claimed by this caller; roll everything
                // back, including the record inserts above.
                tx.rollback().await?;
                return Err(sqlx::Error::RowNotFound);
            }

            sqlx::query(
                "UPDATE files SET processed_chunks = processed_chunks + 1, updated_at = ? \
                 WHERE id = ?",
            )
            .bind(&now)
            .bind(file_id.as_str())
            .execute(&mut *tx)
            .await?;

            tx.commit().await
        })?;
        Ok(())
    }

    async fn fail_chunk(
        &self,
        file_id: &FileId,
        index: u32,
        attempts: u32,
        error: &str,
        terminal: bool,
    ) -> Result<(), IngestError> {
        if terminal {
            with_write_retry!("fail_chunk_terminal", async {
                let mut tx = self.pool.begin().await?;
                let now = Self::now();
                let updated = sqlx::query(
                    "UPDATE chunks SET status = 'failed', attempts = ?, error_message = ?, \
                     updated_at = ? \
                     WHERE file_id = ? AND chunk_index = ? AND status = 'processing'",
                )
                .bind(i64::from(attempts))
                .bind(error)
                .bind(&now)
                .bind(file_id.as_str())
                .bind(i64::from(index))
                .execute(&mut *tx)
                .await?;
                if updated.rows_affected() != 1 {
                    tx.rollback().await?;
                    return Err(sqlx::Error::RowNotFound);
                }
                sqlx::query(
                    "UPDATE files SET failed_chunks = failed_chunks + 1, updated_at = ? \
                     WHERE id = ?",
                )
                .bind(&now)
                .bind(file_id.as_str())
                .execute(&mut *tx)
                .await?;
                tx.commit().await
            })?;
        } else {
            with_write_retry!("fail_chunk_retryable", async {
                sqlx::query(
                    "UPDATE chunks SET status = 'queued', attempts = ?, error_message = ?, \
                     updated_at = ? \
                     WHERE file_id = ? AND chunk_index = ? AND status = 'processing'",
                )
                .bind(i64::from(attempts))
                .bind(error)
                .bind(Self::now())
                .bind(file_id.as_str())
                .bind(i64::from(index))
                .execute(&self.pool)
                .await
            })?;
        }
        Ok(())
    }

    async fn finalize_file_if_done(
        &self,
        file_id: &FileId,
    ) -> Result<Option<FileStatus>, IngestError> {
        let result = with_write_retry!("finalize_file_if_done", async {
            sqlx::query(
                "UPDATE files SET \
                     status = CASE \
                         WHEN failed_chunks = 0 THEN 'completed' \
                         WHEN processed_chunks = 0 THEN 'failed' \
                         ELSE 'completed_with_errors' \
                     END, \
                     updated_at = ? \
                 WHERE id = ? \
                   AND status IN ('queued', 'processing') \
                   AND total_chunks > 0 \
                   AND processed_chunks + failed_chunks >= total_chunks",
            )
            .bind(Self::now())
            .bind(file_id.as_str())
            .execute(&self.pool)
            .await
        })?;

        if result.rows_affected() != 1 {
            return Ok(None);
        }

        let status: String = sqlx::query_scalar("SELECT status FROM files WHERE id = ?")
            .bind(file_id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Self::db_err("finalize_file_if_done", e))?;
        debug!(file_id = %file_id, status = %status, "file finalized");
        Ok(Some(FileStatus::parse(&status)?))
    }

    async fn recover_in_flight(&self) -> Result<Vec<Chunk>, IngestError> {
        let rows = with_write_retry!("recover_in_flight", async {
            sqlx::query(
                "UPDATE chunks SET status = 'queued', updated_at = ? \
                 WHERE status = 'processing' RETURNING *",
            )
            .bind(Self::now())
            .fetch_all(&self.pool)
            .await
        })?;

        rows.iter().map(chunk_from_row).collect()
    }

    async fn files_to_recover(&self) -> Result<Vec<StoredFile>, IngestError> {
        let rows = sqlx::query(
            "SELECT * FROM files WHERE status IN ('queued', 'processing') ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::db_err("files_to_recover", e))?;

        rows.iter().map(file_from_row).collect()
    }

    async fn queued_chunks(&self, file_id: &FileId) -> Result<Vec<Chunk>, IngestError> {
        let rows = sqlx::query(
            "SELECT * FROM chunks WHERE file_id = ? AND status = 'queued' ORDER BY chunk_index",
        )
        .bind(file_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::db_err("queued_chunks", e))?;

        rows.iter().map(chunk_from_row).collect()
    }

    async fn chunk_count(&self, file_id: &FileId) -> Result<u32, IngestError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE file_id = ?")
            .bind(file_id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Self::db_err("chunk_count", e))?;
        to_u32(count, "chunk_count")
    }

    async fn get_chunk(
        &self,
        file_id: &FileId,
        index: u32,
    ) -> Result<Option<Chunk>, IngestError> {
        let row = sqlx::query("SELECT * FROM chunks WHERE file_id = ? AND chunk_index = ?")
            .bind(file_id.as_str())
            .bind(i64::from(index))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::db_err("get_chunk", e))?;

        row.as_ref().map(chunk_from_row).transpose()
    }

    async fn reset_file_plan(&self, file_id: &FileId) -> Result<(), IngestError> {
        with_write_retry!("reset_file_plan", async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM processed_records WHERE file_id = ?")
                .bind(file_id.as_str())
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM chunks WHERE file_id = ?")
                .bind(file_id.as_str())
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "UPDATE files SET status = 'queued', total_chunks = 0, processed_chunks = 0, \
                 failed_chunks = 0, error_message = NULL, updated_at = ? WHERE id = ?",
            )
            .bind(Self::now())
            .bind(file_id.as_str())
            .execute(&mut *tx)
            .await?;
            tx.commit().await
        })?;
        Ok(())
    }

    async fn count_records(&self, file_id: &FileId) -> Result<u64, IngestError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM processed_records WHERE file_id = ?")
                .bind(file_id.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| Self::db_err("count_records", e))?;
        Ok(count as u64)
    }

    async fn list_records(
        &self,
        file_id: &FileId,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<ProcessedRecord>, IngestError> {
        let rows = sqlx::query(
            "SELECT * FROM processed_records WHERE file_id = ? \
             ORDER BY chunk_index ASC, id ASC LIMIT ? OFFSET ?",
        )
        .bind(file_id.as_str())
        .bind(i64::from(limit))
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::db_err("list_records", e))?;

        rows.iter().map(record_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::schema::{ensure_schema, initialize_database};
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn test_repository() -> (Arc<SqliteIngestRepository>, TempDir) {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("test.db").display());
        let pool = initialize_database(&url).await.unwrap();
        ensure_schema(&pool).await.unwrap();
        (Arc::new(SqliteIngestRepository::new(pool)), dir)
    }

    async fn seed_file(repo: &SqliteIngestRepository) -> FileId {
        let file = StoredFile::new(FileId::new(), "data.csv", "/tmp/data.csv");
        repo.create_file(&file).await.unwrap();
        file.id
    }

    fn records_for(file_id: &FileId, chunk_index: u32, rows: u32) -> Vec<ProcessedRecord> {
        (0..rows)
            .map(|i| {
                ProcessedRecord::from_row(
                    file_id.clone(),
                    chunk_index,
                    vec![i.to_string(), format!("row-{}", i)],
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_create_and_get_file() {
        let (repo, _dir) = test_repository().await;
        let id = seed_file(&repo).await;

        let fetched = repo.get_file(&id).await.unwrap().unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.status, FileStatus::Queued);
        assert_eq!(fetched.total_chunks, 0);

        let missing = repo.get_file(&FileId::new()).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_update_file_rewrites_mutable_fields() {
        let (repo, _dir) = test_repository().await;
        let id = seed_file(&repo).await;

        let mut file = repo.get_file(&id).await.unwrap().unwrap();
        file.filename = "renamed.csv".to_string();
        file.error_message = Some("note".to_string());
        repo.update_file(&file).await.unwrap();

        let fetched = repo.get_file(&id).await.unwrap().unwrap();
        assert_eq!(fetched.filename, "renamed.csv");
        assert_eq!(fetched.error_message.as_deref(), Some("note"));
    }

    #[tokio::test]
    async fn test_begin_processing_guards_on_status() {
        let (repo, _dir) = test_repository().await;
        let id = seed_file(&repo).await;

        assert!(repo.begin_processing(&id, 4).await.unwrap());
        // Second call loses the guard: the file is no longer queued.
        assert!(!repo.begin_processing(&id, 9).await.unwrap());

        let file = repo.get_file(&id).await.unwrap().unwrap();
        assert_eq!(file.status, FileStatus::Processing);
        assert_eq!(file.total_chunks, 4);
    }

    #[tokio::test]
    async fn test_create_chunk_advances_total() {
        let (repo, _dir) = test_repository().await;
        let id = seed_file(&repo).await;
        repo.begin_processing(&id, 1).await.unwrap();

        repo.create_chunk(&id, 0, ChunkMeta::new(8, 5)).await.unwrap();
        repo.create_chunk(&id, 1, ChunkMeta::new(64, 3)).await.unwrap();

        // Index 1 pushed the total past the up-front estimate of 1.
        let file = repo.get_file(&id).await.unwrap().unwrap();
        assert_eq!(file.total_chunks, 2);
        assert_eq!(repo.chunk_count(&id).await.unwrap(), 2);

        let chunk = repo.get_chunk(&id, 1).await.unwrap().unwrap();
        assert_eq!(chunk.meta, ChunkMeta::new(64, 3));
        assert_eq!(chunk.status, ChunkStatus::Queued);
    }

    #[tokio::test]
    async fn test_claim_chunk_single_winner() {
        let (repo, _dir) = test_repository().await;
        let id = seed_file(&repo).await;
        repo.begin_processing(&id, 1).await.unwrap();
        repo.create_chunk(&id, 0, ChunkMeta::new(8, 5)).await.unwrap();

        assert!(repo.claim_chunk(&id, 0).await.unwrap());
        assert!(!repo.claim_chunk(&id, 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_chunk_concurrent_callers() {
        let (repo, _dir) = test_repository().await;
        let id = seed_file(&repo).await;
        repo.begin_processing(&id, 1).await.unwrap();
        repo.create_chunk(&id, 0, ChunkMeta::new(8, 5)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let repo = repo.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                repo.claim_chunk(&id, 0).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1, "exactly one concurrent claimer must win");
    }

    #[tokio::test]
    async fn test_complete_chunk_is_atomic_and_increments() {
        let (repo, _dir) = test_repository().await;
        let id = seed_file(&repo).await;
        repo.begin_processing(&id, 1).await.unwrap();
        repo.create_chunk(&id, 0, ChunkMeta::new(8, 3)).await.unwrap();
        assert!(repo.claim_chunk(&id, 0).await.unwrap());

        repo.complete_chunk(&id, 0, records_for(&id, 0, 3)).await.unwrap();

        let file = repo.get_file(&id).await.unwrap().unwrap();
        assert_eq!(file.processed_chunks, 1);
        assert_eq!(repo.count_records(&id).await.unwrap(), 3);
        let chunk = repo.get_chunk(&id, 0).await.unwrap().unwrap();
        assert_eq!(chunk.status, ChunkStatus::Completed);
    }

    #[tokio::test]
    async fn test_complete_unclaimed_chunk_inserts_nothing() {
        let (repo, _dir) = test_repository().await;
        let id = seed_file(&repo).await;
        repo.begin_processing(&id, 1).await.unwrap();
        repo.create_chunk(&id, 0, ChunkMeta::new(8, 3)).await.unwrap();

        // Never claimed: the completion must roll back entirely.
        let err = repo.complete_chunk(&id, 0, records_for(&id, 0, 3)).await;
        assert!(err.is_err());
        assert_eq!(repo.count_records(&id).await.unwrap(), 0);
        let file = repo.get_file(&id).await.unwrap().unwrap();
        assert_eq!(file.processed_chunks, 0);
    }

    #[tokio::test]
    async fn test_fail_chunk_retryable_requeues() {
        let (repo, _dir) = test_repository().await;
        let id = seed_file(&repo).await;
        repo.begin_processing(&id, 1).await.unwrap();
        repo.create_chunk(&id, 0, ChunkMeta::new(8, 3)).await.unwrap();
        assert!(repo.claim_chunk(&id, 0).await.unwrap());

        repo.fail_chunk(&id, 0, 1, "transient io", false).await.unwrap();

        let chunk = repo.get_chunk(&id, 0).await.unwrap().unwrap();
        assert_eq!(chunk.status, ChunkStatus::Queued);
        assert_eq!(chunk.attempts, 1);
        assert_eq!(chunk.error_message.as_deref(), Some("transient io"));
        let file = repo.get_file(&id).await.unwrap().unwrap();
        assert_eq!(file.failed_chunks, 0);
    }

    #[tokio::test]
    async fn test_fail_chunk_terminal_counts() {
        let (repo, _dir) = test_repository().await;
        let id = seed_file(&repo).await;
        repo.begin_processing(&id, 1).await.unwrap();
        repo.create_chunk(&id, 0, ChunkMeta::new(8, 3)).await.unwrap();
        assert!(repo.claim_chunk(&id, 0).await.unwrap());

        repo.fail_chunk(&id, 0, 3, "gave up", true).await.unwrap();

        let chunk = repo.get_chunk(&id, 0).await.unwrap().unwrap();
        assert_eq!(chunk.status, ChunkStatus::Failed);
        let file = repo.get_file(&id).await.unwrap().unwrap();
        assert_eq!(file.failed_chunks, 1);
    }

    #[tokio::test]
    async fn test_finalize_applies_each_terminal_status() {
        let (repo, _dir) = test_repository().await;

        // completed: all chunks succeed
        let id = seed_file(&repo).await;
        repo.begin_processing(&id, 1).await.unwrap();
        repo.create_chunk(&id, 0, ChunkMeta::new(8, 1)).await.unwrap();
        assert!(repo.finalize_file_if_done(&id).await.unwrap().is_none());
        repo.claim_chunk(&id, 0).await.unwrap();
        repo.complete_chunk(&id, 0, records_for(&id, 0, 1)).await.unwrap();
        assert_eq!(
            repo.finalize_file_if_done(&id).await.unwrap(),
            Some(FileStatus::Completed)
        );
        // One-shot: a second call is a no-op.
        assert!(repo.finalize_file_if_done(&id).await.unwrap().is_none());

        // completed_with_errors: mixed outcome
        let id = seed_file(&repo).await;
        repo.begin_processing(&id, 2).await.unwrap();
        repo.create_chunk(&id, 0, ChunkMeta::new(8, 1)).await.unwrap();
        repo.create_chunk(&id, 1, ChunkMeta::new(16, 1)).await.unwrap();
        repo.claim_chunk(&id, 0).await.unwrap();
        repo.complete_chunk(&id, 0, records_for(&id, 0, 1)).await.unwrap();
        repo.claim_chunk(&id, 1).await.unwrap();
        repo.fail_chunk(&id, 1, 3, "gave up", true).await.unwrap();
        assert_eq!(
            repo.finalize_file_if_done(&id).await.unwrap(),
            Some(FileStatus::CompletedWithErrors)
        );

        // failed: every chunk failed
        let id = seed_file(&repo).await;
        repo.begin_processing(&id, 1).await.unwrap();
        repo.create_chunk(&id, 0, ChunkMeta::new(8, 1)).await.unwrap();
        repo.claim_chunk(&id, 0).await.unwrap();
        repo.fail_chunk(&id, 0, 3, "gave up", true).await.unwrap();
        assert_eq!(
            repo.finalize_file_if_done(&id).await.unwrap(),
            Some(FileStatus::Failed)
        );
    }

    #[tokio::test]
    async fn test_recover_in_flight_resets_processing() {
        let (repo, _dir) = test_repository().await;
        let id = seed_file(&repo).await;
        repo.begin_processing(&id, 2).await.unwrap();
        repo.create_chunk(&id, 0, ChunkMeta::new(8, 1)).await.unwrap();
        repo.create_chunk(&id, 1, ChunkMeta::new(16, 1)).await.unwrap();
        repo.claim_chunk(&id, 0).await.unwrap();

        let reclaimed = repo.recover_in_flight().await.unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].index, 0);
        assert_eq!(reclaimed[0].status, ChunkStatus::Queued);

        let queued = repo.queued_chunks(&id).await.unwrap();
        assert_eq!(queued.len(), 2);
    }

    #[tokio::test]
    async fn test_reset_file_plan_clears_everything() {
        let (repo, _dir) = test_repository().await;
        let id = seed_file(&repo).await;
        repo.begin_processing(&id, 2).await.unwrap();
        repo.create_chunk(&id, 0, ChunkMeta::new(8, 1)).await.unwrap();
        repo.claim_chunk(&id, 0).await.unwrap();
        repo.complete_chunk(&id, 0, records_for(&id, 0, 1)).await.unwrap();

        repo.reset_file_plan(&id).await.unwrap();

        assert_eq!(repo.chunk_count(&id).await.unwrap(), 0);
        assert_eq!(repo.count_records(&id).await.unwrap(), 0);
        let file = repo.get_file(&id).await.unwrap().unwrap();
        assert_eq!(file.status, FileStatus::Queued);
        assert_eq!(file.total_chunks, 0);
        assert_eq!(file.processed_chunks, 0);
    }

    #[tokio::test]
    async fn test_list_records_is_deterministically_ordered() {
        let (repo, _dir) = test_repository().await;
        let id = seed_file(&repo).await;
        repo.begin_processing(&id, 2).await.unwrap();
        repo.create_chunk(&id, 0, ChunkMeta::new(8, 2)).await.unwrap();
        repo.create_chunk(&id, 1, ChunkMeta::new(32, 2)).await.unwrap();

        // Complete out of file order to prove ordering comes from the query.
        repo.claim_chunk(&id, 1).await.unwrap();
        repo.complete_chunk(&id, 1, records_for(&id, 1, 2)).await.unwrap();
        repo.claim_chunk(&id, 0).await.unwrap();
        repo.complete_chunk(&id, 0, records_for(&id, 0, 2)).await.unwrap();

        let page = repo.list_records(&id, 0, 10).await.unwrap();
        assert_eq!(page.len(), 4);
        assert_eq!(
            page.iter().map(|r| r.chunk_index).collect::<Vec<_>>(),
            vec![0, 0, 1, 1]
        );

        let paged = repo.list_records(&id, 2, 1).await.unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].chunk_index, 1);
    }
}
