//! Handler error type and its HTTP rendering.

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use super::types::ErrorResponse;
use crate::models::ModelError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Client input the service refuses to process.
    #[error("{0}")]
    BadRequest(String),

    /// Failure while saving, parsing, or storing an upload.
    #[error("Error processing file: {0}")]
    Processing(String),

    /// Malformed or oversized multipart body.
    #[error(transparent)]
    Multipart(#[from] MultipartError),

    /// Missing or malformed query parameters.
    #[error(transparent)]
    Query(#[from] QueryRejection),

    /// Missing, mistyped, or malformed JSON body.
    #[error(transparent)]
    Json(#[from] JsonRejection),

    /// Inference failure; not expected once models are loaded.
    #[error("model error: {0}")]
    Model(#[from] ModelError),
}

impl ApiError {
    /// Wraps any error as a processing failure, keeping its message verbatim.
    pub fn processing(err: impl std::fmt::Display) -> Self {
        Self::Processing(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Multipart(e) => e.status(),
            ApiError::Query(e) => e.status(),
            ApiError::Json(e) => e.status(),
            ApiError::Processing(_) | ApiError::Model(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }

        let detail = match &self {
            ApiError::Multipart(e) => e.body_text(),
            ApiError::Query(e) => e.body_text(),
            ApiError::Json(e) => e.body_text(),
            other => other.to_string(),
        };
        (status, Json(ErrorResponse { detail })).into_response()
    }
}
