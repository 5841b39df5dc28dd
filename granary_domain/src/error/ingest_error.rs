// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Ingestion Error Types
//!
//! This module provides the unified error type for the granary ingestion
//! system. Every layer above the domain reports failures through
//! [`IngestError`] so that disposition decisions (retry, fail the chunk,
//! fail the file, reject the upload) can be made from the error value
//! alone.
//!
//! ## Overview
//!
//! The error system provides:
//!
//! - **Specific Variants**: Each variant represents one failure mode of the
//!   ingestion pipeline
//! - **Transience Classification**: `is_transient()` drives the executor's
//!   retry-or-fail decision
//! - **Categorization**: `category()` groups errors for structured logging
//! - **Conversions**: Automatic conversion from `std::io::Error` and
//!   `serde_json::Error`
//!
//! ## Disposition Map
//!
//! | Variant | Raised by | Disposition |
//! |---|---|---|
//! | `ClientInput` | upload admission | 4xx to caller, nothing persisted |
//! | `BlobMissing` | planner / executor | file fails, no retries |
//! | `CsvStructural` | planner validation | file fails, no chunks created |
//! | `Io` | chunk read | retried with backoff |
//! | `Database` | any persistence call | retried with backoff |
//! | `Validation` | config / value objects | surfaced at construction time |
//! | `Cancelled` | shutdown | worker exits cleanly |
//! | `Internal` | everything else | fails the current operation |

use thiserror::Error;

/// Domain-specific errors for the CSV ingestion system.
///
/// This enum represents all possible errors that can occur within the
/// ingestion pipeline. Each variant carries a descriptive message and is
/// designed to provide clear information about what went wrong and how the
/// caller should dispose of it.
///
/// ## Design Principles
///
/// - **Specific**: Each error type represents a specific failure mode
/// - **Actionable**: Error messages provide enough context for debugging
/// - **Categorized**: Errors are grouped by type for systematic handling
/// - **Recoverable**: Transient variants indicate retry-able conditions
#[derive(Error, Debug, Clone)]
pub enum IngestError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid upload: {0}")]
    ClientInput(String),

    #[error("Blob missing: {0}")]
    BlobMissing(String),

    #[error("CSV structure invalid: {0}")]
    CsvStructural(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Chunk not found: {0}")]
    ChunkNotFound(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IngestError {
    /// Creates a new configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Creates a new client-input (admission) error
    pub fn client_input(msg: impl Into<String>) -> Self {
        Self::ClientInput(msg.into())
    }

    /// Creates a new missing-blob error
    pub fn blob_missing(msg: impl Into<String>) -> Self {
        Self::BlobMissing(msg.into())
    }

    /// Creates a new CSV structural error
    pub fn csv_structural(msg: impl Into<String>) -> Self {
        Self::CsvStructural(msg.into())
    }

    /// Creates a new IO error
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Creates a new database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Creates a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Checks whether the error is transient and worth retrying.
    ///
    /// The chunk executor retries transient failures with exponential
    /// backoff up to the configured attempt limit; everything else is
    /// terminal for the operation that raised it.
    pub fn is_transient(&self) -> bool {
        matches!(self, IngestError::Io(_) | IngestError::Database(_))
    }

    /// Gets the error category for structured logging
    pub fn category(&self) -> &'static str {
        match self {
            IngestError::InvalidConfiguration(_) => "configuration",
            IngestError::ClientInput(_) => "admission",
            IngestError::BlobMissing(_) => "blob",
            IngestError::CsvStructural(_) => "csv",
            IngestError::Io(_) => "io",
            IngestError::Database(_) => "database",
            IngestError::Serialization(_) => "serialization",
            IngestError::Validation(_) => "validation",
            IngestError::FileNotFound(_) => "not_found",
            IngestError::ChunkNotFound(_) => "not_found",
            IngestError::Cancelled(_) => "cancellation",
            IngestError::Internal(_) => "internal",
        }
    }
}

// Implement conversion from standard library errors
impl From<std::io::Error> for IngestError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            IngestError::BlobMissing(err.to_string())
        } else {
            IngestError::Io(err.to_string())
        }
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(err: serde_json::Error) -> Self {
        IngestError::Serialization(err.to_string())
    }
}
