// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Application services: the planner, the per-chunk executor, and the
//! process-wide lifecycle manager that wires them together.

pub mod chunk_executor;
pub mod chunk_planner;
pub mod file_lifecycle;

pub use chunk_executor::{ChunkExecutor, ExecutorOptions};
pub use chunk_planner::ChunkPlanner;
pub use file_lifecycle::FileLifecycleManager;
