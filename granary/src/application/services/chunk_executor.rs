// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Chunk Executor
//!
//! The per-chunk state machine run by every worker:
//!
//! ```text
//! claim ──► read ──► commit ──► (completed)
//!              │         │
//!              └────►  error ──► retry (sleep, re-enqueue)  or  failed
//! ```
//!
//! - **claim**: atomic `queued → processing`; a lost claim means another
//!   worker owns the chunk or it already terminated, and the executor
//!   exits silently. This is the duplicate-record defense: re-running the
//!   executor on a completed chunk does nothing.
//! - **read**: the chunk reader on the blocking-I/O pool. A missing blob
//!   fails the chunk and the file immediately, with no retries.
//! - **commit**: one repository transaction inserts the records, completes
//!   the chunk and bumps the file counter. A crash before the commit
//!   leaves no records; the recovered chunk re-reads the same
//!   `(start_cookie, num_rows)` window and produces the same output.
//! - **error**: bounded exponential backoff, then re-enqueue with the
//!   task's original priority; attempts exhausted means the chunk fails
//!   terminally and the file's `failed_chunks` advances.
//! - **finalize**: every path ends by offering the file to
//!   `finalize_file_if_done`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, error, info, warn};

use granary_bootstrap::CancellationToken;
use granary_domain::{
    BlobStore, FileId, IngestError, IngestRepository, ProcessedRecord, RetryPolicy,
};

use crate::infrastructure::io::read_rows_at;
use crate::infrastructure::runtime::{ChunkTask, PriorityTaskQueue, TaskHandler};

/// Executor knobs that come from the application configuration.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorOptions {
    pub retry_policy: RetryPolicy,
    /// Remove the blob once its file finalizes
    pub delete_file_on_complete: bool,
    /// Apply ±10% jitter to backoff sleeps; disabled in tests that assert
    /// exact delays
    pub apply_jitter: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            delete_file_on_complete: false,
            apply_jitter: true,
        }
    }
}

/// Runs one chunk attempt to completion. Shared by all workers.
pub struct ChunkExecutor {
    repository: Arc<dyn IngestRepository>,
    blob_store: Arc<dyn BlobStore>,
    queue: Arc<PriorityTaskQueue>,
    options: ExecutorOptions,
    token: CancellationToken,
}

impl ChunkExecutor {
    pub fn new(
        repository: Arc<dyn IngestRepository>,
        blob_store: Arc<dyn BlobStore>,
        queue: Arc<PriorityTaskQueue>,
        options: ExecutorOptions,
        token: CancellationToken,
    ) -> Self {
        Self {
            repository,
            blob_store,
            queue,
            options,
            token,
        }
    }

    /// One full pass of the state machine for `task`.
    ///
    /// Persistence errors that could not even be recorded against the
    /// chunk row are returned; the worker loop logs them.
    pub async fn execute(&self, task: ChunkTask) -> Result<(), IngestError> {
        let file_id = task.file_id.clone();
        let outcome = self.run_attempt(task).await;
        // The finalize arm runs on every path, success or not.
        self.try_finalize(&file_id).await;
        outcome
    }

    async fn run_attempt(&self, mut task: ChunkTask) -> Result<(), IngestError> {
        if !self.repository.claim_chunk(&task.file_id, task.index).await? {
            debug!(
                file_id = %task.file_id,
                chunk_index = task.index,
                "claim lost, chunk already owned or terminal"
            );
            return Ok(());
        }

        let Some(file) = self.repository.get_file(&task.file_id).await? else {
            // The file row (and, via cascade, this chunk) is gone; there is
            // nothing left to record an outcome against.
            warn!(file_id = %task.file_id, "file row vanished mid-execution");
            return Ok(());
        };

        match self.read_and_commit(&task, &file.path).await {
            Ok(rows) => {
                info!(
                    file_id = %task.file_id,
                    chunk_index = task.index,
                    rows,
                    "chunk completed"
                );
                Ok(())
            }
            Err(err) => {
                task.attempts += 1;
                self.dispose_failure(task, err).await
            }
        }
    }

    /// Read rows at the chunk's cookie and commit them in one transaction.
    async fn read_and_commit(&self, task: &ChunkTask, path: &str) -> Result<usize, IngestError> {
        let blob_path = PathBuf::from(path);
        let meta = task.meta;
        let rows = tokio::task::spawn_blocking(move || {
            read_rows_at(&blob_path, meta.start_cookie, meta.num_rows)
        })
        .await
        .map_err(|e| IngestError::internal(format!("chunk read task panicked: {}", e)))??;

        let count = rows.len();
        let records: Vec<ProcessedRecord> = rows
            .into_iter()
            .map(|fields| ProcessedRecord::from_row(task.file_id.clone(), task.index, fields))
            .collect();

        self.repository
            .complete_chunk(&task.file_id, task.index, records)
            .await?;
        Ok(count)
    }

    /// The error arm: record the failure, then retry or fail terminally.
    async fn dispose_failure(&self, task: ChunkTask, err: IngestError) -> Result<(), IngestError> {
        let message = err.to_string();

        if matches!(err, IngestError::BlobMissing(_)) {
            // The blob is gone for every chunk of this file; retrying is
            // pointless and the file fails as a whole.
            error!(
                file_id = %task.file_id,
                chunk_index = task.index,
                error = %message,
                "blob missing, failing chunk and file"
            );
            self.repository
                .fail_chunk(&task.file_id, task.index, task.attempts, &message, true)
                .await?;
            self.repository
                .mark_file_failed(&task.file_id, &message)
                .await?;
            return Ok(());
        }

        if self.options.retry_policy.should_retry(task.attempts) {
            self.repository
                .fail_chunk(&task.file_id, task.index, task.attempts, &message, false)
                .await?;
            let delay = self.backoff_delay(task.attempts);
            warn!(
                file_id = %task.file_id,
                chunk_index = task.index,
                attempts = task.attempts,
                delay_ms = delay.as_millis() as u64,
                error = %message,
                category = err.category(),
                "chunk attempt failed, retrying after backoff"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    self.queue.push(task);
                }
                _ = self.token.cancelled() => {
                    // The chunk row is already back in `queued`; the next
                    // startup re-enqueues it, so dropping the in-memory
                    // task here loses nothing.
                    debug!(
                        file_id = %task.file_id,
                        chunk_index = task.index,
                        "shutdown during backoff, leaving chunk for recovery"
                    );
                }
            }
            Ok(())
        } else {
            error!(
                file_id = %task.file_id,
                chunk_index = task.index,
                attempts = task.attempts,
                error = %message,
                "chunk attempts exhausted, failing terminally"
            );
            self.repository
                .fail_chunk(&task.file_id, task.index, task.attempts, &message, true)
                .await?;
            Ok(())
        }
    }

    fn backoff_delay(&self, attempts: u32) -> Duration {
        let delay = self.options.retry_policy.delay_for(attempts);
        if !self.options.apply_jitter {
            return delay;
        }
        let factor = rand::rng().random_range(0.9..=1.1);
        delay.mul_f64(factor)
    }

    /// Offer the file to the finalizer; runs on every execution path.
    async fn try_finalize(&self, file_id: &FileId) {
        match self.repository.finalize_file_if_done(file_id).await {
            Ok(Some(status)) => {
                info!(file_id = %file_id, status = %status, "file reached terminal status");
                if self.options.delete_file_on_complete {
                    self.remove_blob(file_id).await;
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(file_id = %file_id, error = %e, "finalization check failed");
            }
        }
    }

    async fn remove_blob(&self, file_id: &FileId) {
        let path = match self.repository.get_file(file_id).await {
            Ok(Some(file)) => PathBuf::from(file.path),
            _ => return,
        };
        if let Err(e) = self.blob_store.remove(&path).await {
            warn!(file_id = %file_id, error = %e, "failed to delete blob after completion");
        }
    }
}

#[async_trait]
impl TaskHandler for ChunkExecutor {
    async fn handle(&self, task: ChunkTask) {
        let file_id = task.file_id.clone();
        let chunk_index = task.index;
        if let Err(e) = self.execute(task).await {
            error!(
                file_id = %file_id,
                chunk_index,
                error = %e,
                category = e.category(),
                "chunk execution failed without a recorded outcome"
            );
        }
    }
}
