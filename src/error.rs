//! Error types for the Scriptorium server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::archive::ArchiveError;
use crate::queue::QueueError;
use crate::storage::StoreError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Queue(e) => match e {
                QueueError::DuplicateJob(_) => (
                    StatusCode::CONFLICT,
                    "duplicate_job",
                    "Job already in queue".to_string(),
                ),
                QueueError::JobNotFound(_) => {
                    (StatusCode::NOT_FOUND, "not_found", "Job not found".to_string())
                }
                QueueError::Store(e) => {
                    tracing::error!("Queue store error: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "storage_error",
                        "Storage error".to_string(),
                    )
                }
            },
            AppError::Storage(e) => match e {
                StoreError::InvalidFileName(name) => (
                    StatusCode::BAD_REQUEST,
                    "bad_request",
                    format!("Invalid file name: {}", name),
                ),
                _ => {
                    tracing::error!("Storage error: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "storage_error",
                        "Storage error".to_string(),
                    )
                }
            },
            AppError::Archive(e) => match e {
                ArchiveError::NothingToArchive => {
                    (StatusCode::NOT_FOUND, "not_found", e.to_string())
                }
                _ => {
                    tracing::error!("Archive error: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "archive_error",
                        "Failed to build archive".to_string(),
                    )
                }
            },
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "io_error",
                    "IO error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}
