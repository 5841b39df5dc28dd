// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # HTTP Handlers
//!
//! The thin adapter over the ingestion core. Upload is the only
//! synchronous failure boundary: admission checks (MIME allow-list, size
//! cap enforced while streaming) reject with 400 and leave nothing behind,
//! neither blob nor file row. Every failure after admission surfaces
//! asynchronously through `/status`.

use std::path::Path as FsPath;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use granary_domain::{FileId, Priority, StoredFile};

use super::error::ApiError;
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub priority: Option<u8>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub file_id: String,
}

#[derive(Debug, Serialize)]
pub struct FileStatusResponse {
    pub id: String,
    pub filename: String,
    pub status: String,
    pub total_chunks: u32,
    pub processed_chunks: u32,
    pub failed_chunks: u32,
    pub progress_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<&StoredFile> for FileStatusResponse {
    fn from(file: &StoredFile) -> Self {
        Self {
            id: file.id.to_string(),
            filename: file.filename.clone(),
            status: file.status.as_str().to_string(),
            total_chunks: file.total_chunks,
            processed_chunks: file.processed_chunks,
            failed_chunks: file.failed_chunks,
            progress_percent: file.progress_percent(),
            error_message: file.error_message.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ResultsParams {
    pub page: Option<u32>,
    pub size: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct RecordResponse {
    pub id: String,
    pub chunk_index: u32,
    pub data: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct ResultsPage {
    pub results: Vec<RecordResponse>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
    pub pages: u64,
}

/// `GET /health`
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `POST /upload`: multipart form field `file`, optional `?priority=0..10`.
pub async fn upload(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let priority = Priority::new(params.priority.unwrap_or(Priority::MIN))
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let field = loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?;
        match field {
            Some(field) if field.name() == Some("file") => break field,
            Some(_) => continue,
            None => {
                return Err(ApiError::BadRequest(
                    "Missing multipart field 'file'".to_string(),
                ))
            }
        }
    };

    if !state.config.is_content_type_allowed(field.content_type()) {
        return Err(ApiError::BadRequest(format!(
            "Only CSV files are allowed, got: {}",
            field.content_type().unwrap_or("none")
        )));
    }

    let original_name = field
        .file_name()
        .map(|name| {
            FsPath::new(name)
                .file_name()
                .map(|base| base.to_string_lossy().into_owned())
                .unwrap_or_else(|| name.to_string())
        })
        .unwrap_or_else(|| "upload.csv".to_string());
    let extension = FsPath::new(&original_name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    let file_id = FileId::new();
    let blob_path = state.blob_store.allocate(&file_id, &extension).await?;

    // Stream the upload to the blob store, enforcing the size cap as bytes
    // arrive so an oversized body never lands in full.
    let mut field = field;
    let max_bytes = state.config.max_upload_bytes();
    let mut written: u64 = 0;
    let mut out = tokio::fs::File::create(&blob_path)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to create blob: {}", e)))?;

    loop {
        let bytes = match field.chunk().await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => break,
            Err(e) => {
                drop(out);
                discard_blob(&state, &blob_path).await;
                return Err(ApiError::BadRequest(format!("Invalid multipart body: {}", e)));
            }
        };
        written += bytes.len() as u64;
        if written > max_bytes {
            drop(out);
            discard_blob(&state, &blob_path).await;
            return Err(ApiError::BadRequest(
                "File size exceeds configured limit".to_string(),
            ));
        }
        if let Err(e) = out.write_all(&bytes).await {
            drop(out);
            discard_blob(&state, &blob_path).await;
            return Err(ApiError::Internal(format!("Failed to write blob: {}", e)));
        }
    }
    if let Err(e) = out.flush().await {
        drop(out);
        discard_blob(&state, &blob_path).await;
        return Err(ApiError::Internal(format!("Failed to write blob: {}", e)));
    }
    drop(out);
    debug!(file_id = %file_id, bytes = written, "upload stored");

    let file = match state
        .lifecycle
        .admit(
            file_id,
            &original_name,
            &blob_path.to_string_lossy(),
            priority,
        )
        .await
    {
        Ok(file) => file,
        Err(e) => {
            // Admission failed after the blob was stored; leave no orphan.
            discard_blob(&state, &blob_path).await;
            return Err(e.into());
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            file_id: file.id.to_string(),
        }),
    ))
}

async fn discard_blob(state: &AppState, path: &FsPath) {
    if let Err(e) = state.blob_store.remove(path).await {
        warn!(path = %path.display(), error = %e, "failed to discard rejected upload");
    }
}

/// `GET /status/{file_id}`
pub async fn file_status(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<FileStatusResponse>, ApiError> {
    // A malformed id cannot name a file, so it reads as unknown.
    let id = FileId::parse(&file_id)
        .map_err(|_| ApiError::NotFound("File not found".to_string()))?;
    let file = state
        .repository
        .get_file(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("File not found".to_string()))?;

    Ok(Json(FileStatusResponse::from(&file)))
}

/// `GET /results/{file_id}?page=&size=`
pub async fn file_results(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    Query(params): Query<ResultsParams>,
) -> Result<Json<ResultsPage>, ApiError> {
    let page = params.page.unwrap_or(1);
    let size = params.size.unwrap_or(10);
    if page < 1 {
        return Err(ApiError::BadRequest("page must be >= 1".to_string()));
    }
    if !(1..=100).contains(&size) {
        return Err(ApiError::BadRequest("size must be in 1..=100".to_string()));
    }

    let id = FileId::parse(&file_id)
        .map_err(|_| ApiError::NotFound("File not found".to_string()))?;
    if state.repository.get_file(&id).await?.is_none() {
        return Err(ApiError::NotFound("File not found".to_string()));
    }

    let total = state.repository.count_records(&id).await?;
    let pages = total.div_ceil(u64::from(size));
    let offset = u64::from(page - 1) * u64::from(size);

    let records = if offset < total {
        state.repository.list_records(&id, offset, size).await?
    } else {
        Vec::new()
    };

    Ok(Json(ResultsPage {
        results: records
            .into_iter()
            .map(|record| RecordResponse {
                id: record.id,
                chunk_index: record.chunk_index,
                data: record.data,
            })
            .collect(),
        total,
        page,
        size,
        pages,
    }))
}
