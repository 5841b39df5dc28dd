// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! HTTP error mapping. Handler failures become structured JSON bodies
//! (`{"detail": ...}`) with the matching status code; internal failures
//! are logged with their category and never leak details to the caller.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use granary_domain::IngestError;

/// Error type returned by every HTTP handler.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::ClientInput(msg) | IngestError::Validation(msg) => {
                ApiError::BadRequest(msg)
            }
            IngestError::FileNotFound(id) => ApiError::NotFound(format!("File not found: {}", id)),
            other => {
                tracing::error!(
                    target: "http::error",
                    category = other.category(),
                    error = %other,
                    "request failed"
                );
                ApiError::Internal("Internal server error".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::BadRequest(msg) => {
                tracing::warn!(target: "http::error", status = 400, detail = %msg, "bad request");
                (StatusCode::BAD_REQUEST, msg)
            }
            ApiError::NotFound(msg) => {
                tracing::debug!(target: "http::error", status = 404, detail = %msg, "not found");
                (StatusCode::NOT_FOUND, msg)
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
