// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Granary
//!
//! Asynchronous CSV ingestion service. Uploads are admitted over HTTP,
//! planned into byte-offset-anchored chunks, processed by a bounded
//! priority-scheduled worker pool with bounded exponential-backoff
//! retries, and finalized exactly once when every chunk has terminated.
//! The database is the source of truth; a restart reclaims in-flight work
//! with no duplicate output.
//!
//! ## Layers
//!
//! - [`application`]: the planner, executor, lifecycle manager, and the
//!   [`application::IngestSystem`] builder that composes one stack per
//!   process
//! - [`infrastructure`]: environment config, blocking CSV file access,
//!   the SQLite persistence gateway, the filesystem blob store, and the
//!   scheduling runtime (priority queue + worker pool)
//! - [`presentation`]: the axum HTTP surface

pub mod application;
pub mod infrastructure;
pub mod presentation;
