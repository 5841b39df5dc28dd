// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Priority Task Queue
//!
//! In-memory ordered queue of ready chunk tasks, shared by the planner
//! (producer) and the worker pool (consumers). Ordering is by
//! `(priority DESC, chunk index ASC, insertion order ASC)`: urgent files
//! preempt at dequeue time, and within one file and priority level chunks
//! are attempted in file order.
//!
//! The queue is a cache, not a ledger: it is bounded only by memory and
//! never persisted. The durable backlog is the set of `queued` chunk rows
//! in the database, which the lifecycle manager re-enqueues on startup.
//!
//! The heap node carries the comparator tuple explicitly; ordering never
//! relies on derived tuple ordering of the task record itself.

use std::collections::BinaryHeap;

use parking_lot::Mutex;
use tokio::sync::Notify;

use granary_domain::{ChunkMeta, FileId, Priority};

/// One schedulable unit of work: a chunk plus its read coordinates and
/// scheduling metadata.
#[derive(Debug, Clone)]
pub struct ChunkTask {
    pub file_id: FileId,
    pub index: u32,
    pub meta: ChunkMeta,
    /// Failed executions so far; carried across re-enqueues
    pub attempts: u32,
    /// Scheduling hint; preserved across retries, not across restarts
    pub priority: Priority,
}

impl ChunkTask {
    pub fn new(file_id: FileId, index: u32, meta: ChunkMeta, priority: Priority) -> Self {
        Self {
            file_id,
            index,
            meta,
            attempts: 0,
            priority,
        }
    }
}

/// Heap node: the explicit comparator tuple plus the payload.
struct QueueEntry {
    priority: u8,
    index: u32,
    seq: u64,
    task: ChunkTask,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.index == other.index && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap pops the maximum: highest priority first, then the
        // earliest chunk index, then first-in-first-out.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.index.cmp(&self.index))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct QueueState {
    heap: BinaryHeap<QueueEntry>,
    next_seq: u64,
}

/// Shared priority queue of ready chunk tasks.
pub struct PriorityTaskQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl PriorityTaskQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_seq: 0,
            }),
            notify: Notify::new(),
        }
    }

    /// Enqueues a task and wakes one waiting worker.
    pub fn push(&self, task: ChunkTask) {
        {
            let mut state = self.state.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.heap.push(QueueEntry {
                priority: task.priority.value(),
                index: task.index,
                seq,
                task,
            });
        }
        self.notify.notify_one();
    }

    /// Removes and returns the most urgent task without waiting.
    pub fn try_pop(&self) -> Option<ChunkTask> {
        self.state.lock().heap.pop().map(|entry| entry.task)
    }

    /// Removes and returns the most urgent task, waiting for one to arrive
    /// if the queue is empty.
    ///
    /// The notified future is registered before the queue is re-checked, so
    /// a push racing with this call is never missed.
    pub async fn pop(&self) -> ChunkTask {
        loop {
            let notified = self.notify.notified();
            if let Some(task) = self.try_pop() {
                return task;
            }
            notified.await;
        }
    }

    /// Number of tasks currently queued
    pub fn len(&self) -> usize {
        self.state.lock().heap.len()
    }

    /// Whether the queue is currently empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PriorityTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
