// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Ingestion System Composition
//!
//! Builds the whole processing stack exactly once per process: queue,
//! executor, worker pool, planner and lifecycle manager, wired from a
//! configuration plus a persistence gateway. The builder is the injection
//! seam for tests, which pass failure-wrapping repositories or their own
//! blob stores; the server binary passes the real SQLite gateway.
//!
//! There is deliberately no global instance anywhere; handlers receive
//! the system through axum state.

use std::sync::Arc;

use granary_bootstrap::ShutdownCoordinator;
use granary_domain::{BlobStore, IngestError, IngestRepository};

use crate::application::services::{
    ChunkExecutor, ChunkPlanner, ExecutorOptions, FileLifecycleManager,
};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::runtime::{PriorityTaskQueue, WorkerPool};
use crate::infrastructure::storage::FilesystemBlobStore;
use crate::presentation::http::{create_router, AppState};

/// One process's fully-wired ingestion stack.
pub struct IngestSystem {
    pub config: Arc<AppConfig>,
    pub repository: Arc<dyn IngestRepository>,
    pub blob_store: Arc<dyn BlobStore>,
    pub queue: Arc<PriorityTaskQueue>,
    pub pool: Arc<WorkerPool>,
    pub lifecycle: Arc<FileLifecycleManager>,
    pub coordinator: ShutdownCoordinator,
}

impl IngestSystem {
    /// Starts composing a system
    pub fn builder(config: AppConfig) -> IngestSystemBuilder {
        IngestSystemBuilder::new(config)
    }

    /// The HTTP router over this system
    pub fn router(&self) -> axum::Router {
        create_router(AppState {
            lifecycle: self.lifecycle.clone(),
            repository: self.repository.clone(),
            blob_store: self.blob_store.clone(),
            config: self.config.clone(),
        })
    }

    /// Startup recovery pass (see the lifecycle manager)
    pub async fn recover(&self) -> Result<(), IngestError> {
        self.lifecycle.recover().await
    }

    /// Cancels the workers and waits for in-flight chunks to finish
    pub async fn shutdown(&self) {
        self.coordinator.initiate_shutdown();
        self.lifecycle.shutdown().await;
        self.coordinator.complete_shutdown();
    }
}

/// Builder for [`IngestSystem`]. The repository is the only mandatory
/// dependency; everything else has a production default derived from the
/// configuration.
pub struct IngestSystemBuilder {
    config: AppConfig,
    repository: Option<Arc<dyn IngestRepository>>,
    blob_store: Option<Arc<dyn BlobStore>>,
    coordinator: Option<ShutdownCoordinator>,
    apply_jitter: bool,
}

impl IngestSystemBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            repository: None,
            blob_store: None,
            coordinator: None,
            apply_jitter: true,
        }
    }

    /// Sets the persistence gateway (required)
    pub fn repository(mut self, repository: Arc<dyn IngestRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Overrides the blob store (default: filesystem store under
    /// `STORAGE_DIR`)
    pub fn blob_store(mut self, blob_store: Arc<dyn BlobStore>) -> Self {
        self.blob_store = Some(blob_store);
        self
    }

    /// Shares an externally-owned shutdown coordinator
    pub fn coordinator(mut self, coordinator: ShutdownCoordinator) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Disables backoff jitter so tests can assert exact delays
    pub fn without_jitter(mut self) -> Self {
        self.apply_jitter = false;
        self
    }

    pub fn build(self) -> Result<IngestSystem, IngestError> {
        let repository = self.repository.ok_or_else(|| {
            IngestError::invalid_config("IngestSystem requires a persistence gateway")
        })?;
        let config = Arc::new(self.config);
        let blob_store = self
            .blob_store
            .unwrap_or_else(|| Arc::new(FilesystemBlobStore::new(config.storage_dir.clone())));
        let coordinator = self.coordinator.unwrap_or_default();

        let queue = Arc::new(PriorityTaskQueue::new());
        let executor = Arc::new(ChunkExecutor::new(
            repository.clone(),
            blob_store.clone(),
            queue.clone(),
            ExecutorOptions {
                retry_policy: config.retry_policy,
                delete_file_on_complete: config.delete_file_on_complete,
                apply_jitter: self.apply_jitter,
            },
            coordinator.token(),
        ));
        let pool = Arc::new(WorkerPool::new(
            config.effective_concurrency(),
            queue.clone(),
            executor,
            coordinator.token(),
        ));
        let planner = Arc::new(ChunkPlanner::new(
            repository.clone(),
            pool.clone(),
            config.chunk_size,
        ));
        let lifecycle = Arc::new(FileLifecycleManager::new(
            repository.clone(),
            blob_store.clone(),
            planner,
            pool.clone(),
            config.disable_background,
            config.delete_file_on_complete,
        ));

        Ok(IngestSystem {
            config,
            repository,
            blob_store,
            queue,
            pool,
            lifecycle,
            coordinator,
        })
    }
}
