// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # File Lifecycle Manager
//!
//! Owns the file-level view of ingestion: admits uploads, launches the
//! planner, and drives crash recovery at startup. There is exactly one
//! manager per process, constructed at init from configuration plus the
//! repository and blob store, and injected into the HTTP handlers; there
//! is no global singleton.
//!
//! ## Recovery model
//!
//! The database is the source of truth; the in-memory queue is a cache.
//! On startup the manager:
//!
//! 1. Resets every `processing` chunk back to `queued` (the crash happened
//!    before their commit, so no records exist for them).
//! 2. Walks every file still in `queued`/`processing`:
//!    - `queued`: the planner never ran; plan from scratch.
//!    - `processing` with fewer persisted chunks than `total_chunks` (or
//!      no total at all): the planner crashed mid-scan. The plan is
//!      deleted wholesale and rebuilt. Chunk creation is idempotent
//!      because the scan is deterministic.
//!    - otherwise: re-enqueue the file's `queued` chunks with default
//!      priority (priority is a scheduling hint and is not persisted), and
//!      offer the file to the finalizer in case the crash landed between
//!      the last chunk's commit and finalization.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};

use granary_domain::{
    BlobStore, FileId, FileStatus, IngestError, IngestRepository, Priority, StoredFile,
};

use crate::application::services::chunk_planner::ChunkPlanner;
use crate::infrastructure::runtime::{ChunkTask, WorkerPool};

/// Process-wide coordinator for file admission, planning and recovery.
pub struct FileLifecycleManager {
    repository: Arc<dyn IngestRepository>,
    blob_store: Arc<dyn BlobStore>,
    planner: Arc<ChunkPlanner>,
    pool: Arc<WorkerPool>,
    /// Admission only; no background planning (test mode)
    disable_background: bool,
    delete_file_on_complete: bool,
}

impl FileLifecycleManager {
    pub fn new(
        repository: Arc<dyn IngestRepository>,
        blob_store: Arc<dyn BlobStore>,
        planner: Arc<ChunkPlanner>,
        pool: Arc<WorkerPool>,
        disable_background: bool,
        delete_file_on_complete: bool,
    ) -> Self {
        Self {
            repository,
            blob_store,
            planner,
            pool,
            disable_background,
            delete_file_on_complete,
        }
    }

    /// Admits an uploaded blob: persists the `queued` file row and, unless
    /// background processing is disabled, launches planning.
    pub async fn admit(
        &self,
        file_id: FileId,
        filename: &str,
        path: &str,
        priority: Priority,
    ) -> Result<StoredFile, IngestError> {
        let file = StoredFile::new(file_id, filename, path);
        self.repository.create_file(&file).await?;
        info!(
            file_id = %file.id,
            filename = %file.filename,
            priority = %priority,
            "file admitted"
        );

        if !self.disable_background {
            self.spawn_planning(file.clone(), priority);
        }
        Ok(file)
    }

    /// Runs the planner for an already-admitted file. Used by tests (with
    /// background disabled) and by recovery.
    pub async fn process_file(&self, file_id: &FileId, priority: Priority) -> Result<(), IngestError> {
        let file = self
            .repository
            .get_file(file_id)
            .await?
            .ok_or_else(|| IngestError::FileNotFound(file_id.to_string()))?;
        self.planner.plan_file(&file, priority).await
    }

    fn spawn_planning(&self, file: StoredFile, priority: Priority) {
        let planner = self.planner.clone();
        tokio::spawn(async move {
            if let Err(e) = planner.plan_file(&file, priority).await {
                error!(
                    file_id = %file.id,
                    error = %e,
                    category = e.category(),
                    "background planning failed"
                );
            }
        });
    }

    /// Startup recovery pass. Call once, after the schema is ensured and
    /// before serving traffic.
    pub async fn recover(&self) -> Result<(), IngestError> {
        let reclaimed = self.repository.recover_in_flight().await?;
        if !reclaimed.is_empty() {
            info!(count = reclaimed.len(), "reclaimed in-flight chunks");
        }

        let files = self.repository.files_to_recover().await?;
        for file in files {
            match file.status {
                FileStatus::Queued => {
                    info!(file_id = %file.id, "recovering never-planned file");
                    self.planner.plan_file(&file, Priority::default()).await?;
                }
                FileStatus::Processing => {
                    let persisted = self.repository.chunk_count(&file.id).await?;
                    if file.total_chunks == 0 || persisted < file.total_chunks {
                        info!(
                            file_id = %file.id,
                            persisted,
                            total_chunks = file.total_chunks,
                            "incomplete plan detected, re-planning from scratch"
                        );
                        self.repository.reset_file_plan(&file.id).await?;
                        let fresh = self
                            .repository
                            .get_file(&file.id)
                            .await?
                            .ok_or_else(|| IngestError::FileNotFound(file.id.to_string()))?;
                        self.planner.plan_file(&fresh, Priority::default()).await?;
                    } else {
                        self.resume_planned_file(&file).await?;
                    }
                }
                // files_to_recover only returns non-terminal statuses
                _ => {}
            }
        }
        Ok(())
    }

    /// Re-enqueues a fully-planned file's backlog and closes the
    /// finalization gap left by a crash after the last chunk terminated.
    async fn resume_planned_file(&self, file: &StoredFile) -> Result<(), IngestError> {
        let queued = self.repository.queued_chunks(&file.id).await?;
        let backlog = queued.len();
        for chunk in queued {
            // Attempt counts survive the restart; only priority is reset.
            self.pool.submit(ChunkTask {
                file_id: chunk.file_id,
                index: chunk.index,
                meta: chunk.meta,
                attempts: chunk.attempts,
                priority: Priority::default(),
            });
        }

        if let Some(status) = self.repository.finalize_file_if_done(&file.id).await? {
            info!(file_id = %file.id, status = %status, "file finalized during recovery");
            if self.delete_file_on_complete {
                let path = PathBuf::from(&file.path);
                if let Err(e) = self.blob_store.remove(&path).await {
                    warn!(file_id = %file.id, error = %e, "failed to delete blob during recovery");
                }
            }
        } else if backlog > 0 {
            info!(file_id = %file.id, backlog, "re-enqueued recovered chunks");
        }
        Ok(())
    }

    /// Stops the worker pool, waiting for in-flight chunks to finish.
    pub async fn shutdown(&self) {
        self.pool.stop().await;
    }
}
