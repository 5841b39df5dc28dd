// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Ingest Repository (Persistence Gateway Port)
//!
//! This module defines the narrow, transactional persistence interface the
//! ingestion core is written against. The database is the source of truth
//! for crash recovery: every durable transition (chunk creation, claim,
//! completion, failure, finalization) is a single transaction behind one of
//! these methods, and the in-memory priority queue is purely a cache of
//! `queued` chunks.
//!
//! ## Contract highlights
//!
//! - **Atomic claims**: [`IngestRepository::claim_chunk`] is linearizable;
//!   under concurrent callers for the same `(file, index)` exactly one
//!   returns `true`.
//! - **Atomic counters**: file counters are incremented with SQL
//!   expressions (`processed_chunks = processed_chunks + 1`), never
//!   read-modify-write, so concurrent worker commits cannot lose updates.
//! - **One-shot finalization**:
//!   [`IngestRepository::finalize_file_if_done`] applies the terminal
//!   status at most once per file.
//!
//! Implementations live in the infrastructure layer (SQLite via `sqlx`);
//! tests exercise the core through wrapping doubles at this seam.

use async_trait::async_trait;

use crate::entities::{Chunk, ChunkMeta, FileStatus, ProcessedRecord, StoredFile};
use crate::value_objects::FileId;
use crate::IngestError;

/// Narrow transactional persistence operations on files, chunks and
/// records.
///
/// All methods are cancel-safe at transaction granularity: a cancelled
/// caller leaves the database either before or after the transaction,
/// never inside it.
#[async_trait]
pub trait IngestRepository: Send + Sync {
    /// Persists a freshly-admitted file (status `queued`).
    async fn create_file(&self, file: &StoredFile) -> Result<(), IngestError>;

    /// Fetches a file by id.
    async fn get_file(&self, id: &FileId) -> Result<Option<StoredFile>, IngestError>;

    /// Writes back a file's mutable fields. Last-writer-wins; the progress
    /// counters must still be advanced through the increment-carrying
    /// operations below, never through this method, so concurrent worker
    /// commits are not lost.
    async fn update_file(&self, file: &StoredFile) -> Result<(), IngestError>;

    /// Moves a file straight to `failed` with a reason. Used for validation
    /// failures and missing blobs; does not touch counters.
    async fn mark_file_failed(&self, id: &FileId, reason: &str) -> Result<(), IngestError>;

    /// Atomically transitions a file `queued → processing` and records the
    /// planner's up-front chunk total. Returns `false` when the file is not
    /// in `queued` (another planner run owns it or it already terminated).
    async fn begin_processing(&self, id: &FileId, total_chunks: u32) -> Result<bool, IngestError>;

    /// Creates one planned chunk (status `queued`). In the same
    /// transaction, advances the owning file's `total_chunks` to
    /// `max(current, index + 1)` so the total is correct even when the
    /// up-front estimate was low.
    async fn create_chunk(
        &self,
        file_id: &FileId,
        index: u32,
        meta: ChunkMeta,
    ) -> Result<(), IngestError>;

    /// Atomic transition `queued → processing` for one chunk. Returns
    /// `false` if the chunk is already processing or terminal; the caller
    /// must then skip the chunk without side effects.
    async fn claim_chunk(&self, file_id: &FileId, index: u32) -> Result<bool, IngestError>;

    /// Single transaction: insert all records, mark the chunk `completed`,
    /// and increment the file's `processed_chunks` by one.
    async fn complete_chunk(
        &self,
        file_id: &FileId,
        index: u32,
        records: Vec<ProcessedRecord>,
    ) -> Result<(), IngestError>;

    /// Records a chunk failure. With `terminal == false` the chunk returns
    /// to `queued` (retry pending) with the attempt count and error stored;
    /// with `terminal == true` the chunk is marked `failed` and the file's
    /// `failed_chunks` is incremented, in one transaction.
    async fn fail_chunk(
        &self,
        file_id: &FileId,
        index: u32,
        attempts: u32,
        error: &str,
        terminal: bool,
    ) -> Result<(), IngestError>;

    /// Atomically applies the terminal status when every planned chunk has
    /// terminated (`processed + failed == total`, `total > 0`) and the file
    /// is not already terminal. Returns the status applied by **this** call,
    /// or `None` when nothing was done.
    async fn finalize_file_if_done(
        &self,
        file_id: &FileId,
    ) -> Result<Option<FileStatus>, IngestError>;

    /// Startup recovery: resets every chunk in `processing` back to
    /// `queued` and returns them for re-enqueue.
    async fn recover_in_flight(&self) -> Result<Vec<Chunk>, IngestError>;

    /// Files that were interrupted mid-lifecycle (status `queued` or
    /// `processing`), for the lifecycle manager's startup pass.
    async fn files_to_recover(&self) -> Result<Vec<StoredFile>, IngestError>;

    /// All chunks of a file currently in `queued`, in index order.
    async fn queued_chunks(&self, file_id: &FileId) -> Result<Vec<Chunk>, IngestError>;

    /// Number of chunk rows persisted for a file.
    async fn chunk_count(&self, file_id: &FileId) -> Result<u32, IngestError>;

    /// Fetches one chunk by `(file_id, index)`.
    async fn get_chunk(&self, file_id: &FileId, index: u32)
        -> Result<Option<Chunk>, IngestError>;

    /// Deletes every chunk and record of a file and zeroes its counters.
    /// Used when a mid-scan planner crash forces a re-plan from scratch.
    async fn reset_file_plan(&self, file_id: &FileId) -> Result<(), IngestError>;

    /// Total number of records stored for a file.
    async fn count_records(&self, file_id: &FileId) -> Result<u64, IngestError>;

    /// One page of records ordered by `(chunk_index ASC, id ASC)`.
    async fn list_records(
        &self,
        file_id: &FileId,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<ProcessedRecord>, IngestError>;
}
