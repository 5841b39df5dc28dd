// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Chunk Planner
//!
//! Turns an admitted file into an ordered set of chunk rows and queue
//! tasks. The planner runs once per file (plus re-runs during crash
//! recovery) in three steps:
//!
//! 1. **Validate** the blob's CSV structure and count its data rows. A
//!    structural violation fails the file immediately; no chunks are ever
//!    created for it.
//! 2. **Begin processing**: atomically move the file `queued → processing`
//!    and record the up-front chunk total computed from the row count.
//!    Setting the total before any chunk exists makes a mid-scan crash
//!    detectable on restart (persisted chunks < total).
//! 3. **Scan** the blob once, carving byte-offset-anchored chunks of up to
//!    `CHUNK_SIZE` rows. Each emitted chunk is persisted first (which also
//!    advances `total_chunks` via max, normally a no-op) and then
//!    submitted to the worker pool. A chunk therefore becomes claimable
//!    only after its row (and the file total covering it) is durable.
//!
//! The header row is consumed as the column schema and is never planned
//! as data. Both the validation pass and the scan are blocking file I/O
//! and run on the blocking-I/O pool.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use granary_domain::{
    ChunkMeta, ChunkSize, IngestError, IngestRepository, Priority, StoredFile,
};

use crate::infrastructure::io::{plan_chunks, validate_structure};
use crate::infrastructure::runtime::{ChunkTask, WorkerPool};

/// Plans files into chunks and feeds the worker pool.
pub struct ChunkPlanner {
    repository: Arc<dyn IngestRepository>,
    pool: Arc<WorkerPool>,
    chunk_size: ChunkSize,
}

impl ChunkPlanner {
    pub fn new(
        repository: Arc<dyn IngestRepository>,
        pool: Arc<WorkerPool>,
        chunk_size: ChunkSize,
    ) -> Self {
        Self {
            repository,
            pool,
            chunk_size,
        }
    }

    /// Plans one file and enqueues its chunks at `priority`.
    ///
    /// Validation failures and missing blobs are terminal for the file and
    /// are recorded on its row; they are not errors of the planning call
    /// itself. Only persistence failures surface as `Err`.
    pub async fn plan_file(&self, file: &StoredFile, priority: Priority) -> Result<(), IngestError> {
        let path = PathBuf::from(&file.path);

        // Step 1: structural validation plus the row count for the
        // up-front total.
        let validation_path = path.clone();
        let structure = tokio::task::spawn_blocking(move || validate_structure(&validation_path))
            .await
            .map_err(|e| IngestError::internal(format!("validation task panicked: {}", e)))?;

        let structure = match structure {
            Ok(structure) => structure,
            Err(err @ (IngestError::CsvStructural(_) | IngestError::BlobMissing(_))) => {
                warn!(file_id = %file.id, error = %err, "file rejected during planning");
                self.repository
                    .mark_file_failed(&file.id, &format!("CSV validation failed: {}", err))
                    .await?;
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        if structure.data_rows == 0 {
            self.repository
                .mark_file_failed(&file.id, "CSV validation failed: no data rows found")
                .await?;
            return Ok(());
        }

        let total_chunks = self.chunk_size.chunks_needed_for_rows(structure.data_rows) as u32;

        // Step 2: claim the planning run.
        if !self.repository.begin_processing(&file.id, total_chunks).await? {
            warn!(
                file_id = %file.id,
                "file is not queued, skipping plan (another planner run owns it)"
            );
            return Ok(());
        }

        // Step 3: the single-pass scan.
        let scan_path = path.clone();
        let chunk_size = self.chunk_size;
        let plan = tokio::task::spawn_blocking(move || plan_chunks(&scan_path, chunk_size))
            .await
            .map_err(|e| IngestError::internal(format!("scan task panicked: {}", e)))?;

        let plan = match plan {
            Ok(plan) => plan,
            Err(err) => {
                // The blob changed or vanished between validation and scan.
                warn!(file_id = %file.id, error = %err, "chunk scan failed");
                self.repository
                    .mark_file_failed(&file.id, &format!("Chunk scan failed: {}", err))
                    .await?;
                return Ok(());
            }
        };

        for planned in &plan {
            let meta = ChunkMeta::new(planned.start_cookie, planned.num_rows);
            self.repository
                .create_chunk(&file.id, planned.index, meta)
                .await?;
            self.pool.submit(ChunkTask::new(
                file.id.clone(),
                planned.index,
                meta,
                priority,
            ));
        }

        info!(
            file_id = %file.id,
            total_chunks = plan.len(),
            data_rows = structure.data_rows,
            columns = structure.columns,
            priority = %priority,
            "file planned into chunks"
        );
        Ok(())
    }
}
