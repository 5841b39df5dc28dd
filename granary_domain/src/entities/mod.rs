// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Entities
//!
//! Identity-bearing objects of the ingestion domain, mirroring the three
//! persisted tables: uploaded files, their planned chunks, and the durable
//! records the executor produces.

pub mod chunk;
pub mod processed_record;
pub mod stored_file;

pub use chunk::{Chunk, ChunkMeta, ChunkStatus};
pub use processed_record::ProcessedRecord;
pub use stored_file::{FileStatus, StoredFile};
