// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Database Bootstrap
//!
//! Creates the SQLite database (if missing), opens the connection pool,
//! and applies the idempotent schema. Startup fails hard when any of this
//! does not succeed; a half-initialized schema would violate the
//! database-as-source-of-truth recovery model.
//!
//! Connections are opened with WAL journaling, foreign keys on and a busy
//! timeout, so readers (status/results queries) do not block behind the
//! single writer.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

use granary_domain::IngestError;

/// Idempotent DDL for the three tables and their secondary indices.
const SCHEMA_DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS files (
        id TEXT PRIMARY KEY,
        filename TEXT NOT NULL,
        path TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'queued',
        total_chunks INTEGER NOT NULL DEFAULT 0,
        processed_chunks INTEGER NOT NULL DEFAULT 0,
        failed_chunks INTEGER NOT NULL DEFAULT 0,
        error_message TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS chunks (
        id TEXT PRIMARY KEY,
        file_id TEXT NOT NULL REFERENCES files(id) ON DELETE CASCADE,
        chunk_index INTEGER NOT NULL,
        status TEXT NOT NULL DEFAULT 'queued',
        attempts INTEGER NOT NULL DEFAULT 0,
        result_meta TEXT,
        error_message TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS processed_records (
        id TEXT PRIMARY KEY,
        file_id TEXT NOT NULL REFERENCES files(id) ON DELETE CASCADE,
        chunk_index INTEGER NOT NULL,
        data TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS ix_chunks_file_index
        ON chunks(file_id, chunk_index)",
    "CREATE INDEX IF NOT EXISTS ix_chunks_file_status
        ON chunks(file_id, status)",
    "CREATE INDEX IF NOT EXISTS ix_records_file_chunk
        ON processed_records(file_id, chunk_index)",
];

/// Opens the connection pool for `database_url`, creating the database
/// file when it does not exist yet.
pub async fn initialize_database(database_url: &str) -> Result<SqlitePool, IngestError> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| {
            IngestError::InvalidConfiguration(format!(
                "Invalid DATABASE_URL '{}': {}",
                database_url, e
            ))
        })?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| IngestError::Database(format!("Failed to connect to database: {}", e)))?;

    info!(database_url, "database pool initialized");
    Ok(pool)
}

/// Applies the schema. Safe to run on every startup.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), IngestError> {
    debug!("ensuring database schema");
    for ddl in SCHEMA_DDL {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .map_err(|e| IngestError::Database(format!("Failed to apply schema: {}", e)))?;
    }
    Ok(())
}
