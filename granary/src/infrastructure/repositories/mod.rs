// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! SQLite persistence: database bootstrap and the gateway implementation.

pub mod schema;
pub mod sqlite_ingest_repository;

pub use schema::{ensure_schema, initialize_database};
pub use sqlite_ingest_repository::SqliteIngestRepository;
