// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Chunk Size Value Object
//!
//! This module provides a type-safe representation of the chunk size used
//! by the planner: the number of CSV **rows** carried by one chunk. It
//! ensures chunk sizes are within valid bounds and provides convenient
//! methods for plan arithmetic.
//!
//! ## Overview
//!
//! The chunk size value object provides:
//!
//! - **Validation**: Ensures chunk sizes are within acceptable bounds
//! - **Type Safety**: A row count cannot be confused with a byte count
//! - **Plan Arithmetic**: Chunk counts for a known number of data rows
//! - **Serialization**: JSON serialization support
//!
//! ## Chunk Size Constraints
//!
//! ### Minimum Size (1 row)
//! - **Purpose**: Ensures chunks contain at least some data
//! - **Impact**: Prevents degenerate plans with empty chunks
//!
//! ### Maximum Size (1,000,000 rows)
//! - **Purpose**: Bounds the size of the executor's single-transaction
//!   record insert
//! - **Impact**: Keeps per-chunk memory and transaction size predictable
//!
//! ### Default Size (10,000 rows)
//! - **Purpose**: Balanced default for typical uploads
//! - **Impact**: A 500 MB CSV plans into a few thousand chunks

use crate::IngestError;
use serde::{Deserialize, Serialize};

/// Value object representing a chunk size (rows per chunk) with validation.
///
/// # Key Features
///
/// - **Validation**: Ensures chunk sizes are within acceptable bounds
///   (1 row to 1,000,000 rows)
/// - **Immutability**: Once created, chunk sizes cannot be modified
/// - **Serialization**: Full JSON serialization support
///
/// # Examples
///
/// ```
/// use granary_domain::ChunkSize;
///
/// let size = ChunkSize::new(5).unwrap();
/// assert_eq!(size.rows(), 5);
/// assert_eq!(size.chunks_needed_for_rows(23), 5);
///
/// assert!(ChunkSize::new(0).is_err());
/// assert_eq!(ChunkSize::default().rows(), 10_000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkSize {
    rows: u32,
}

impl ChunkSize {
    /// Minimum chunk size (1 row) - a chunk must carry at least one row
    pub const MIN_ROWS: u32 = 1;

    /// Maximum chunk size (1,000,000 rows) - bounds the commit transaction
    pub const MAX_ROWS: u32 = 1_000_000;

    /// Default chunk size (10,000 rows)
    pub const DEFAULT_ROWS: u32 = 10_000;

    /// Creates a new chunk size with validation
    ///
    /// # Arguments
    ///
    /// * `rows` - Rows per chunk (must be between 1 and 1,000,000)
    ///
    /// # Errors
    ///
    /// Returns `IngestError::InvalidConfiguration` if the row count is out
    /// of bounds.
    pub fn new(rows: u32) -> Result<Self, IngestError> {
        if rows < Self::MIN_ROWS {
            return Err(IngestError::InvalidConfiguration(format!(
                "Chunk size {} is below minimum of {} row",
                rows,
                Self::MIN_ROWS
            )));
        }

        if rows > Self::MAX_ROWS {
            return Err(IngestError::InvalidConfiguration(format!(
                "Chunk size {} exceeds maximum of {} rows",
                rows,
                Self::MAX_ROWS
            )));
        }

        Ok(ChunkSize { rows })
    }

    /// Gets the chunk size in rows
    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Calculates the number of chunks a plan produces for the given number
    /// of data rows.
    ///
    /// Zero rows need zero chunks; otherwise the count is the ceiling of
    /// `data_rows / rows_per_chunk`.
    pub fn chunks_needed_for_rows(&self, data_rows: u64) -> u64 {
        data_rows.div_ceil(u64::from(self.rows))
    }
}

impl Default for ChunkSize {
    fn default() -> Self {
        ChunkSize {
            rows: Self::DEFAULT_ROWS,
        }
    }
}

impl std::fmt::Display for ChunkSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} rows", self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_bounds() {
        assert!(ChunkSize::new(0).is_err());
        assert!(ChunkSize::new(1).is_ok());
        assert!(ChunkSize::new(ChunkSize::MAX_ROWS).is_ok());
        assert!(ChunkSize::new(ChunkSize::MAX_ROWS + 1).is_err());
    }

    #[test]
    fn test_chunks_needed() {
        let size = ChunkSize::new(5).unwrap();
        assert_eq!(size.chunks_needed_for_rows(0), 0);
        assert_eq!(size.chunks_needed_for_rows(1), 1);
        assert_eq!(size.chunks_needed_for_rows(5), 1);
        assert_eq!(size.chunks_needed_for_rows(6), 2);
        assert_eq!(size.chunks_needed_for_rows(23), 5);
    }

    proptest! {
        #[test]
        fn prop_chunks_cover_all_rows(rows in 0u64..1_000_000, per_chunk in 1u32..50_000) {
            let size = ChunkSize::new(per_chunk).unwrap();
            let chunks = size.chunks_needed_for_rows(rows);
            // Enough chunks to hold every row, and no fully-empty tail chunk.
            prop_assert!(chunks * u64::from(per_chunk) >= rows);
            if chunks > 0 {
                prop_assert!((chunks - 1) * u64::from(per_chunk) < rows);
            }
        }
    }
}
