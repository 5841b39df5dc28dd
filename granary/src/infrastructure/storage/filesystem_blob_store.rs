// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Filesystem Blob Store
//!
//! Directory-backed implementation of the [`BlobStore`] port. Blobs live
//! under a single root directory and are named `{file_id}{extension}`;
//! client-supplied filenames never influence the on-disk layout. Reads are
//! plain seekable file access, so the planner and chunk reader open blob
//! paths directly.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use granary_domain::{BlobStore, FileId, IngestError};

/// Blob store over one local directory.
pub struct FilesystemBlobStore {
    root: PathBuf,
}

impl FilesystemBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory blobs are placed under
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn allocate(&self, file_id: &FileId, extension: &str) -> Result<PathBuf, IngestError> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            IngestError::Io(format!(
                "Failed to create storage directory {}: {}",
                self.root.display(),
                e
            ))
        })?;

        // Extension comes from the upload's original name; anything without
        // one is stored as .dat.
        let extension = if extension.is_empty() { ".dat" } else { extension };
        Ok(self.root.join(format!("{}{}", file_id, extension)))
    }

    async fn remove(&self, path: &Path) -> Result<(), IngestError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "removed blob");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IngestError::Io(format!(
                "Failed to remove blob {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }
}
