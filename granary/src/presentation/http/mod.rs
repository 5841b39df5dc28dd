// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # HTTP Surface
//!
//! The axum router over the ingestion core. Four routes: upload, status,
//! paginated results, health. The core is injected through [`AppState`];
//! handlers never own processing state of their own.

mod error;
mod handlers;

pub use error::ApiError;
pub use handlers::{FileStatusResponse, RecordResponse, ResultsPage, UploadResponse};

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use granary_domain::{BlobStore, IngestRepository};

use crate::application::services::FileLifecycleManager;
use crate::infrastructure::config::AppConfig;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<FileLifecycleManager>,
    pub repository: Arc<dyn IngestRepository>,
    pub blob_store: Arc<dyn BlobStore>,
    pub config: Arc<AppConfig>,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    tracing::debug!(target: "http", "creating API router");

    // axum's default body limit (2 MB) is far below MAX_UPLOAD_MB; the
    // real cap is enforced while streaming, this just lets bodies through.
    let body_limit = state.config.max_upload_bytes() as usize + 1024 * 1024;

    Router::new()
        .route("/health", get(handlers::health))
        .route("/upload", post(handlers::upload))
        .route("/status/:file_id", get(handlers::file_status))
        .route("/results/:file_id", get(handlers::file_results))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
