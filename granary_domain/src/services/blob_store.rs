// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Blob Store Port
//!
//! Byte-addressable storage for uploaded CSVs. Blobs are keyed by file id
//! plus the upload's original extension; client-supplied names never reach
//! the filesystem layout. The planner and the chunk reader open blob paths
//! directly for seekable reads, so the port only manages placement and
//! deletion.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::value_objects::FileId;
use crate::IngestError;

/// Placement and deletion of uploaded blobs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Computes the destination path for a new blob and makes sure its
    /// parent directory exists. The caller streams the upload there.
    async fn allocate(&self, file_id: &FileId, extension: &str) -> Result<PathBuf, IngestError>;

    /// Removes a blob. Missing blobs are not an error (removal is
    /// best-effort and may race with retention cleanup).
    async fn remove(&self, path: &Path) -> Result<(), IngestError>;

    /// Whether a blob currently exists at `path`.
    async fn exists(&self, path: &Path) -> bool;
}
