// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Processed Record Entity
//!
//! One output row produced by the executor. The record stores the source
//! row's fields opaquely, as a JSON array of strings in row order; no type
//! inference is performed. Records for a chunk are inserted atomically in
//! the same transaction that completes the chunk, so a record can never
//! exist for a chunk that is not `completed`.

use crate::value_objects::FileId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One durable output row.
///
/// A record's lifetime is bounded by its file's retention; deleting a file
/// cascades to its records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub id: String,
    pub file_id: FileId,
    pub chunk_index: u32,
    /// The source row's fields as a JSON array of strings, in row order
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ProcessedRecord {
    /// Creates a record from one parsed CSV row
    pub fn from_row(file_id: FileId, chunk_index: u32, fields: Vec<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_id,
            chunk_index,
            data: serde_json::Value::Array(
                fields.into_iter().map(serde_json::Value::String).collect(),
            ),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_row_preserves_field_order() {
        let record = ProcessedRecord::from_row(
            FileId::new(),
            2,
            vec!["1".to_string(), "Ada".to_string(), "".to_string()],
        );
        assert_eq!(record.chunk_index, 2);
        assert_eq!(record.data, serde_json::json!(["1", "Ada", ""]));
    }
}
