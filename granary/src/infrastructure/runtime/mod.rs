// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Scheduling runtime: the shared priority queue and the worker pool.

pub mod task_queue;
pub mod worker_pool;

pub use task_queue::{ChunkTask, PriorityTaskQueue};
pub use worker_pool::{TaskHandler, WorkerPool};
