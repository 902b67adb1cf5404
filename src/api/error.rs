use crate::services::storage::StorageError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Link Expired: {0}")]
    Gone(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(_) => AppError::NotFound("File not found".to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl AppError {
    /// Client-facing status and message. Server faults are logged here and
    /// reported without detail.
    fn status_and_message(self) -> (StatusCode, String) {
        match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Gone(msg) => (StatusCode::GONE, msg),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                internal_error()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                internal_error()
            }
            AppError::Anyhow(e) => {
                tracing::error!("Anyhow error: {:?}", e);
                internal_error()
            }
        }
    }
}

fn internal_error() -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal Server Error".to_string(),
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expired_is_distinct_from_not_found() {
        let gone = AppError::Gone("Link expired".to_string()).into_response();
        let missing = AppError::NotFound("Share not found".to_string()).into_response();
        assert_eq!(gone.status(), StatusCode::GONE);
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_storage_errors_map_to_client_statuses() {
        let missing: AppError = StorageError::NotFound("k".to_string()).into();
        assert!(matches!(missing, AppError::NotFound(_)));

        let invalid: AppError = StorageError::InvalidKey("../k".to_string()).into();
        assert_eq!(
            invalid.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
