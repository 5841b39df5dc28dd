// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Chunk Entity
//!
//! This module provides the `Chunk` entity: an ordered slice of one file's
//! CSV rows, anchored to a byte offset in the blob. Chunks are the unit of
//! scheduling, execution and retry.
//!
//! ## Overview
//!
//! A chunk is identified by `(file_id, index)` where indices are dense and
//! 0-based in file order. The chunk carries its read coordinates in
//! [`ChunkMeta`]: `start_cookie` is a byte offset such that seeking there
//! and parsing CSV yields the chunk's first row, and `num_rows` is the
//! number of rows the chunk owns.
//!
//! ## State machine
//!
//! ```text
//! queued ──claim──► processing ──commit──► completed
//!    ▲                   │
//!    └──retryable error──┘──attempts exhausted──► failed
//! ```
//!
//! The `queued → processing` claim is an atomic database transition and is
//! the single-owner guarantee: exactly one worker wins a claim.

use crate::value_objects::FileId;
use crate::IngestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing status of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl ChunkStatus {
    /// String form used in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStatus::Queued => "queued",
            ChunkStatus::Processing => "processing",
            ChunkStatus::Completed => "completed",
            ChunkStatus::Failed => "failed",
        }
    }

    /// Parses the database string form
    pub fn parse(value: &str) -> Result<Self, IngestError> {
        match value {
            "queued" => Ok(ChunkStatus::Queued),
            "processing" => Ok(ChunkStatus::Processing),
            "completed" => Ok(ChunkStatus::Completed),
            "failed" => Ok(ChunkStatus::Failed),
            other => Err(IngestError::Validation(format!(
                "Unknown chunk status '{}'",
                other
            ))),
        }
    }

    /// Whether no further transitions are possible from this status
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChunkStatus::Completed | ChunkStatus::Failed)
    }
}

impl std::fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Read coordinates for one chunk, persisted as the chunk's `result_meta`.
///
/// `start_cookie` for chunk k+1 always lies strictly after the last byte
/// consumed for chunk k's rows; re-reading from the cookie is therefore
/// idempotent and never crosses a chunk boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    /// Byte offset of the chunk's first row within the blob
    pub start_cookie: u64,
    /// Number of rows the chunk owns
    pub num_rows: u32,
}

impl ChunkMeta {
    pub fn new(start_cookie: u64, num_rows: u32) -> Self {
        Self {
            start_cookie,
            num_rows,
        }
    }
}

/// An ordered slice of one file's CSV rows.
///
/// Identity is `(file_id, index)`; the surrogate `id` exists for the
/// primary key only. `attempts` counts failed executions and is bounded by
/// the retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub file_id: FileId,
    pub index: u32,
    pub status: ChunkStatus,
    pub attempts: u32,
    pub meta: ChunkMeta,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chunk {
    /// Creates a freshly-planned chunk in `queued` status
    pub fn new(file_id: FileId, index: u32, meta: ChunkMeta) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_id,
            index,
            status: ChunkStatus::Queued,
            attempts: 0,
            meta,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            ChunkStatus::Queued,
            ChunkStatus::Processing,
            ChunkStatus::Completed,
            ChunkStatus::Failed,
        ] {
            assert_eq!(ChunkStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(ChunkStatus::parse("done").is_err());
    }

    #[test]
    fn test_new_chunk_is_queued_with_zero_attempts() {
        let chunk = Chunk::new(FileId::new(), 0, ChunkMeta::new(17, 500));
        assert_eq!(chunk.status, ChunkStatus::Queued);
        assert_eq!(chunk.attempts, 0);
        assert_eq!(chunk.meta.start_cookie, 17);
        assert_eq!(chunk.meta.num_rows, 500);
    }

    #[test]
    fn test_meta_serde_shape() {
        let meta = ChunkMeta::new(1024, 10);
        let json = serde_json::to_value(meta).unwrap();
        assert_eq!(json["start_cookie"], 1024);
        assert_eq!(json["num_rows"], 10);
    }
}
