// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Worker Pool
//!
//! A bounded set of long-lived workers draining the shared priority queue.
//! Each worker repeats: pop a task, acquire a pool permit, run the handler
//! to completion. Workers are started lazily on the first submission and
//! stopped by cancelling the shared token; a cancelled worker finishes its
//! current task (never stopping mid-transaction) and then exits.
//!
//! The permit semaphore is sized to the worker count. It is redundant with
//! the worker count today and exists to throttle external I/O if handlers
//! ever spawn subtasks that should share the pool's budget.
//!
//! No work is lost on a clean stop: durable state lives in the database,
//! and the lifecycle manager re-enqueues every `queued` chunk on the next
//! startup.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use granary_bootstrap::CancellationToken;

use super::task_queue::{ChunkTask, PriorityTaskQueue};

/// Consumer side of the pool: executes one task to completion.
///
/// The chunk executor implements this; tests substitute recording doubles.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: ChunkTask);
}

/// Bounded pool of workers over one shared [`PriorityTaskQueue`].
pub struct WorkerPool {
    queue: Arc<PriorityTaskQueue>,
    handler: Arc<dyn TaskHandler>,
    concurrency: usize,
    permits: Arc<Semaphore>,
    token: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl WorkerPool {
    /// Creates a stopped pool.
    ///
    /// `concurrency` is the number of workers spawned on first submission;
    /// the caller is expected to have already applied the backend's
    /// single-writer cap.
    pub fn new(
        concurrency: usize,
        queue: Arc<PriorityTaskQueue>,
        handler: Arc<dyn TaskHandler>,
        token: CancellationToken,
    ) -> Self {
        Self {
            queue,
            handler,
            concurrency: concurrency.max(1),
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            token,
            workers: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Enqueues a task, starting the workers on the first call.
    pub fn submit(&self, task: ChunkTask) {
        self.ensure_started();
        self.queue.push(task);
    }

    /// Number of tasks waiting in the queue
    pub fn backlog(&self) -> usize {
        self.queue.len()
    }

    /// Spawns the workers exactly once.
    fn ensure_started(&self) {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        info!(workers = self.concurrency, "starting worker pool");
        let mut workers = self.workers.lock();
        for worker_id in 0..self.concurrency {
            let queue = self.queue.clone();
            let handler = self.handler.clone();
            let permits = self.permits.clone();
            let token = self.token.clone();
            workers.push(tokio::spawn(async move {
                worker_loop(worker_id, queue, handler, permits, token).await;
            }));
        }
    }

    /// Cancels the workers and waits for each to finish its current task.
    pub async fn stop(&self) {
        self.token.cancel();
        let workers = std::mem::take(&mut *self.workers.lock());
        for result in futures::future::join_all(workers).await {
            if let Err(e) = result {
                warn!(error = %e, "worker task did not join cleanly");
            }
        }
        self.started.store(false, Ordering::SeqCst);
        debug!("worker pool stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<PriorityTaskQueue>,
    handler: Arc<dyn TaskHandler>,
    permits: Arc<Semaphore>,
    token: CancellationToken,
) {
    debug!(worker_id, "worker started");
    loop {
        let task = tokio::select! {
            _ = token.cancelled() => break,
            task = queue.pop() => task,
        };

        let permit = match permits.acquire().await {
            Ok(permit) => permit,
            // Closed semaphore means the pool is tearing down.
            Err(_) => break,
        };
        debug!(
            worker_id,
            file_id = %task.file_id,
            chunk_index = task.index,
            "worker picked up chunk"
        );
        handler.handle(task).await;
        drop(permit);
    }
    debug!(worker_id, "worker exited");
}
