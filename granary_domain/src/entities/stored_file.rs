// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stored File Entity
//!
//! This module provides the `StoredFile` entity: one uploaded blob moving
//! through the ingestion lifecycle. The entity mirrors the `files` table
//! and is the unit the finalization invariant is expressed on.
//!
//! ## Lifecycle
//!
//! ```text
//! queued ──► processing ──► completed
//!    │            │    └───► completed_with_errors
//!    │            └────────► failed
//!    └─────────────────────► failed        (validation / missing blob)
//! ```
//!
//! A file is created on upload in `queued`. The planner moves it to
//! `processing` and establishes `total_chunks`; the executor increments the
//! two counters as chunks terminate; finalization applies the terminal
//! status exactly once when `processed_chunks + failed_chunks ==
//! total_chunks` and `total_chunks > 0`.
//!
//! ## Invariants
//!
//! - `processed_chunks + failed_chunks ≤ total_chunks` at all times
//! - `total_chunks` is non-decreasing once set
//! - A terminal status is never left

use crate::value_objects::FileId;
use crate::IngestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing status of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Queued,
    Processing,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl FileStatus {
    /// String form used in the database and over the API
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Queued => "queued",
            FileStatus::Processing => "processing",
            FileStatus::Completed => "completed",
            FileStatus::CompletedWithErrors => "completed_with_errors",
            FileStatus::Failed => "failed",
        }
    }

    /// Parses the database string form
    pub fn parse(value: &str) -> Result<Self, IngestError> {
        match value {
            "queued" => Ok(FileStatus::Queued),
            "processing" => Ok(FileStatus::Processing),
            "completed" => Ok(FileStatus::Completed),
            "completed_with_errors" => Ok(FileStatus::CompletedWithErrors),
            "failed" => Ok(FileStatus::Failed),
            other => Err(IngestError::Validation(format!(
                "Unknown file status '{}'",
                other
            ))),
        }
    }

    /// Whether no further transitions are possible from this status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FileStatus::Completed | FileStatus::CompletedWithErrors | FileStatus::Failed
        )
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One uploaded blob and its chunk-level progress counters.
///
/// # Key Features
///
/// - **Identity**: Identified by [`FileId`]; equality is identity-based
/// - **Counters**: `processed_chunks` / `failed_chunks` are maintained by
///   atomic SQL increments, never read-modify-write
/// - **Finalization**: `terminal_status_for_counts` computes the terminal
///   status the finalizer applies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: FileId,
    /// Display name from the upload; never used for filesystem paths
    pub filename: String,
    /// Location of the blob in the blob store
    pub path: String,
    pub status: FileStatus,
    pub total_chunks: u32,
    pub processed_chunks: u32,
    pub failed_chunks: u32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredFile {
    /// Creates a freshly-admitted file in `queued` status
    pub fn new(id: FileId, filename: impl Into<String>, path: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            filename: filename.into(),
            path: path.into(),
            status: FileStatus::Queued,
            total_chunks: 0,
            processed_chunks: 0,
            failed_chunks: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Number of chunks that have reached a terminal status
    pub fn terminated_chunks(&self) -> u32 {
        self.processed_chunks + self.failed_chunks
    }

    /// Whether every planned chunk has terminated and the plan is non-empty
    pub fn all_chunks_terminated(&self) -> bool {
        self.total_chunks > 0 && self.terminated_chunks() >= self.total_chunks
    }

    /// Progress through the plan as a percentage in `0.0..=100.0`.
    ///
    /// Zero until the planner has established `total_chunks`.
    pub fn progress_percent(&self) -> f64 {
        if self.total_chunks == 0 {
            return 0.0;
        }
        (f64::from(self.terminated_chunks()) / f64::from(self.total_chunks)) * 100.0
    }

    /// Terminal status implied by the current counters.
    ///
    /// All chunks succeeded → `completed`; all failed → `failed`; a mix →
    /// `completed_with_errors`.
    pub fn terminal_status_for_counts(&self) -> FileStatus {
        if self.failed_chunks == 0 {
            FileStatus::Completed
        } else if self.processed_chunks == 0 {
            FileStatus::Failed
        } else {
            FileStatus::CompletedWithErrors
        }
    }
}
