use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::storage::StorageError;
use sea_orm::DbErr;
use serde::Serialize;

use crate::dedup::DedupError;

/// Structured error response returned by all endpoints on failure.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code. One of: `VALIDATION_ERROR`, `NOT_FOUND`,
    /// `PAYLOAD_TOO_LARGE`, `STORAGE_UNAVAILABLE`, `INTERNAL_ERROR`.
    #[schema(example = "VALIDATION_ERROR")]
    pub code: &'static str,
    /// Human-readable error description.
    #[schema(example = "Missing 'file' field")]
    pub message: String,
}

/// Application-level error type.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    NotFound(String),
    PayloadTooLarge(String),
    /// Blob store or database could not complete the operation. Nothing was
    /// committed; the request may be retried.
    StorageUnavailable(String),
    Internal(String),
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        match self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "VALIDATION_ERROR",
                    message: msg,
                },
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    code: "NOT_FOUND",
                    message: msg,
                },
            ),
            AppError::PayloadTooLarge(msg) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorBody {
                    code: "PAYLOAD_TOO_LARGE",
                    message: msg,
                },
            ),
            AppError::StorageUnavailable(detail) => {
                tracing::error!("Storage unavailable: {}", detail);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorBody {
                        code: "STORAGE_UNAVAILABLE",
                        message: "Storage is temporarily unavailable".into(),
                    },
                )
            }
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "INTERNAL_ERROR",
                        message: "An unexpected error occurred".into(),
                    },
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => {
                tracing::warn!("Blob missing for {key}");
                AppError::NotFound("File content not found".into())
            }
            StorageError::InvalidHash(detail) | StorageError::InvalidKey(detail) => {
                AppError::Internal(detail)
            }
            StorageError::SizeLimitExceeded { actual, limit } => AppError::PayloadTooLarge(
                format!("File exceeds the size limit ({actual} > {limit} bytes)"),
            ),
            StorageError::Source(e) => AppError::Validation(format!("Failed to read upload: {e}")),
            StorageError::Io(e) => AppError::StorageUnavailable(e.to_string()),
        }
    }
}

impl From<DedupError> for AppError {
    fn from(err: DedupError) -> Self {
        match err {
            DedupError::StreamRead(e) => AppError::Validation(format!("Failed to read upload: {e}")),
            DedupError::IncompleteStream => {
                AppError::Validation("Upload ended before the file was complete".into())
            }
            DedupError::SizeLimitExceeded { actual, limit } => AppError::PayloadTooLarge(
                format!("File exceeds the size limit ({actual} > {limit} bytes)"),
            ),
            DedupError::NotFound(id) => AppError::NotFound(format!("File {id} not found")),
            DedupError::BlobStoreUnavailable(e) => AppError::StorageUnavailable(e.to_string()),
            DedupError::Registry(e) => AppError::StorageUnavailable(e.to_string()),
            DedupError::InvalidFingerprint(detail) => AppError::Internal(detail),
        }
    }
}
