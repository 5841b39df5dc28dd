// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Granary Domain
//!
//! The granary domain represents the core business logic and rules of the
//! CSV ingestion system. It implements Domain-Driven Design (DDD) patterns
//! and is completely independent of external concerns like databases, file
//! systems, or HTTP.
//!
//! ## Module Structure
//!
//! - [`entities`]: identity-bearing objects mirroring the persisted
//!   tables: [`StoredFile`], [`Chunk`], [`ProcessedRecord`]
//! - [`value_objects`]: immutable, self-validating values ([`FileId`],
//!   [`ChunkSize`], [`Priority`], [`RetryPolicy`])
//! - [`repositories`]: the persistence gateway port
//!   ([`IngestRepository`]) the core is written against
//! - [`services`]: other infrastructure ports ([`BlobStore`])
//! - [`error`]: the unified [`IngestError`] type
//!
//! ## Domain-Driven Design Concepts
//!
//! ### Entities
//!
//! Entities have a distinct identity that persists through state changes.
//! `StoredFile` is identified by its [`FileId`]; `Chunk` by
//! `(file_id, index)`.
//!
//! ### Value Objects
//!
//! Value objects are immutable, compared by value and self-validating.
//! [`ChunkSize`] rejects out-of-range row counts at construction;
//! [`RetryPolicy`] is a pure function from attempt counts to delays.
//!
//! ### Ports
//!
//! The domain defines async traits for persistence and blob storage that
//! the infrastructure layer implements. These ports are the seams where
//! tests inject failure-wrapping doubles.

pub mod entities;
pub mod error;
pub mod repositories;
pub mod services;
pub mod value_objects;

// Re-export commonly used types at the crate root
pub use entities::{Chunk, ChunkMeta, ChunkStatus, FileStatus, ProcessedRecord, StoredFile};
pub use error::IngestError;
pub use repositories::IngestRepository;
pub use services::BlobStore;
pub use value_objects::{ChunkSize, FileId, Priority, RetryPolicy};
