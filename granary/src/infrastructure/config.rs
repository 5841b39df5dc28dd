// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Application Configuration
//!
//! This module loads the service configuration from environment variables.
//! `DATABASE_URL` is the only required variable; everything else has a
//! production default.
//!
//! ## Variables
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `DATABASE_URL` | (required) | SQLite connection string |
//! | `MAX_CONCURRENCY` | 10 | Worker pool size; effective 1 on SQLite |
//! | `CHUNK_SIZE` | 10000 | Rows per chunk |
//! | `MAX_RETRIES` | 3 | Attempt bound per chunk |
//! | `BASE_BACKOFF` | 1.0 | First retry delay, seconds |
//! | `MAX_BACKOFF` | 30.0 | Retry delay cap, seconds |
//! | `MAX_UPLOAD_MB` | 500 | Upload size limit |
//! | `ALLOWED_CONTENT_TYPES` | `text/csv,application/csv` | MIME allow-list |
//! | `DELETE_FILE_ON_COMPLETE` | false | Remove the blob once the file finalizes |
//! | `DISABLE_BACKGROUND` | false | Admission only, no planner task (tests) |
//! | `STORAGE_DIR` | `./storage/uploads` | Blob store root |
//! | `BIND_ADDR` | `127.0.0.1:8000` | HTTP listen address |

use std::env;
use std::path::PathBuf;

use granary_domain::{ChunkSize, IngestError, RetryPolicy};

/// Default MIME allow-list for uploads
pub const DEFAULT_ALLOWED_CONTENT_TYPES: &str = "text/csv,application/csv";

/// Runtime configuration for the ingestion service.
///
/// Constructed once at process start and shared immutably behind an `Arc`;
/// there is no runtime reconfiguration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub max_concurrency: usize,
    pub chunk_size: ChunkSize,
    pub retry_policy: RetryPolicy,
    pub max_upload_mb: u64,
    pub allowed_content_types: Vec<String>,
    pub delete_file_on_complete: bool,
    pub disable_background: bool,
    pub storage_dir: PathBuf,
    pub bind_addr: String,
}

impl AppConfig {
    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `IngestError::InvalidConfiguration` when `DATABASE_URL` is
    /// missing or any variable fails to parse or validate.
    pub fn from_env() -> Result<Self, IngestError> {
        let database_url = env::var("DATABASE_URL").map_err(|_| {
            IngestError::InvalidConfiguration("DATABASE_URL must be set".to_string())
        })?;

        let max_concurrency = parse_var("MAX_CONCURRENCY", 10usize)?;
        if max_concurrency == 0 {
            return Err(IngestError::InvalidConfiguration(
                "MAX_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        let chunk_size = ChunkSize::new(parse_var("CHUNK_SIZE", ChunkSize::DEFAULT_ROWS)?)?;
        let retry_policy = RetryPolicy::new(
            parse_var("MAX_RETRIES", RetryPolicy::DEFAULT_MAX_RETRIES)?,
            parse_var("BASE_BACKOFF", RetryPolicy::DEFAULT_BASE_BACKOFF_SECS)?,
            parse_var("MAX_BACKOFF", RetryPolicy::DEFAULT_MAX_BACKOFF_SECS)?,
        )?;

        let allowed_content_types = env::var("ALLOWED_CONTENT_TYPES")
            .unwrap_or_else(|_| DEFAULT_ALLOWED_CONTENT_TYPES.to_string())
            .split(',')
            .map(|ct| ct.trim().to_ascii_lowercase())
            .filter(|ct| !ct.is_empty())
            .collect::<Vec<_>>();
        if allowed_content_types.is_empty() {
            return Err(IngestError::InvalidConfiguration(
                "ALLOWED_CONTENT_TYPES must list at least one MIME type".to_string(),
            ));
        }

        Ok(Self {
            database_url,
            max_concurrency,
            chunk_size,
            retry_policy,
            max_upload_mb: parse_var("MAX_UPLOAD_MB", 500u64)?,
            allowed_content_types,
            delete_file_on_complete: parse_bool("DELETE_FILE_ON_COMPLETE", false)?,
            disable_background: parse_bool("DISABLE_BACKGROUND", false)?,
            storage_dir: PathBuf::from(
                env::var("STORAGE_DIR").unwrap_or_else(|_| "./storage/uploads".to_string()),
            ),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8000".to_string()),
        })
    }

    /// Worker pool size after accounting for the backend's write model.
    ///
    /// SQLite is a single-writer store; running more than one worker only
    /// produces busy-retry churn, so concurrency is capped at 1 there
    /// regardless of `MAX_CONCURRENCY`.
    pub fn effective_concurrency(&self) -> usize {
        if self.database_url.starts_with("sqlite") {
            1
        } else {
            self.max_concurrency
        }
    }

    /// Upload size limit in bytes
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb * 1024 * 1024
    }

    /// Checks an upload's MIME type against the allow-list.
    ///
    /// Uploads without an explicit content type are rejected; parameters
    /// (`; charset=...`) are ignored for the comparison.
    pub fn is_content_type_allowed(&self, content_type: Option<&str>) -> bool {
        match content_type {
            None => false,
            Some(ct) => {
                let essence = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
                self.allowed_content_types.iter().any(|allowed| *allowed == essence)
            }
        }
    }

}

fn parse_var<T>(name: &str, default: T) -> Result<T, IngestError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse::<T>().map_err(|e| {
            IngestError::InvalidConfiguration(format!("Invalid {}='{}': {}", name, raw, e))
        }),
    }
}

fn parse_bool(name: &str, default: bool) -> Result<bool, IngestError> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            other => Err(IngestError::InvalidConfiguration(format!(
                "Invalid {}='{}': expected a boolean",
                name, other
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            database_url: "sqlite://granary.db".to_string(),
            max_concurrency: 10,
            chunk_size: ChunkSize::default(),
            retry_policy: RetryPolicy::default(),
            max_upload_mb: 500,
            allowed_content_types: vec!["text/csv".to_string(), "application/csv".to_string()],
            delete_file_on_complete: false,
            disable_background: false,
            storage_dir: PathBuf::from("./storage/uploads"),
            bind_addr: "127.0.0.1:8000".to_string(),
        }
    }

    #[test]
    fn test_sqlite_caps_concurrency() {
        let config = base_config();
        assert_eq!(config.effective_concurrency(), 1);

        let mut pg = base_config();
        pg.database_url = "postgres://localhost/granary".to_string();
        assert_eq!(pg.effective_concurrency(), 10);
    }

    #[test]
    fn test_content_type_allow_list() {
        let config = base_config();
        assert!(config.is_content_type_allowed(Some("text/csv")));
        assert!(config.is_content_type_allowed(Some("TEXT/CSV; charset=utf-8")));
        assert!(config.is_content_type_allowed(Some("application/csv")));
        assert!(!config.is_content_type_allowed(Some("text/plain")));
        assert!(!config.is_content_type_allowed(None));
    }

    #[test]
    fn test_max_upload_bytes() {
        let mut config = base_config();
        config.max_upload_mb = 2;
        assert_eq!(config.max_upload_bytes(), 2 * 1024 * 1024);
    }
}
