// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # File Identifier Value Object
//!
//! This module provides a type-safe identifier for uploaded files. File
//! identifiers are opaque 128-bit values (UUID v4) encoded as hyphenated
//! strings, matching the wire format used by the HTTP surface and the
//! `files.id` database column.
//!
//! ## Design Principles
//!
//! The identifier follows Domain-Driven Design value object principles:
//!
//! - **Immutability**: Once created, identifiers cannot be modified
//! - **Validation**: Parsed identifiers are validated at creation time
//! - **Equality**: Two identifiers are equal if their string forms match
//! - **Type Safety**: A `FileId` cannot be confused with a chunk index or
//!   any other string-typed value

use crate::IngestError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type-safe identifier for an uploaded file.
///
/// # Key Features
///
/// - **Uniqueness**: Generated identifiers are UUID v4 values
/// - **Opaque Wire Form**: Serialized as a plain string for APIs and storage
/// - **Validation**: `parse` rejects strings that are not valid UUIDs
///
/// # Examples
///
/// ```
/// use granary_domain::FileId;
///
/// let id = FileId::new();
/// let same = FileId::parse(id.as_str()).unwrap();
/// assert_eq!(id, same);
///
/// assert!(FileId::parse("not-a-uuid").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    /// Generates a new random file identifier
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Parses an identifier from its string form
    ///
    /// # Errors
    ///
    /// Returns `IngestError::Validation` if the string is not a valid
    /// hyphenated UUID.
    pub fn parse(value: &str) -> Result<Self, IngestError> {
        uuid::Uuid::parse_str(value)
            .map_err(|e| IngestError::Validation(format!("Invalid file id '{}': {}", value, e)))?;
        Ok(Self(value.to_string()))
    }

    /// Gets the identifier's string form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the identifier, returning the owned string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<FileId> for String {
    fn from(id: FileId) -> Self {
        id.0
    }
}
