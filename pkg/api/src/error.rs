//! JSON error responses shared by every handler.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use pkg_state::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::admission::AdmissionError;

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: u16,
    /// Stable code for programmatic handling.
    pub error: String,
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Admission(#[from] AdmissionError),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Admission(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Admission(_) => "ADMISSION_DENIED",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn not_found(kind: &str, name: &str) -> Self {
        ApiError::NotFound(format!("{} {} not found", kind, name))
    }

    /// Malformed input, as reported by the validators.
    pub fn invalid(err: anyhow::Error) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { key, .. } => {
                ApiError::Conflict(format!("{} was modified concurrently, retry the request", key))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Internal API error: {}", self);
        }
        let body = ErrorResponse {
            status: status.as_u16(),
            error: self.code().to_string(),
            message: self.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_conflict_maps_to_409() {
        let err: ApiError = StoreError::Conflict {
            key: "/registry/resourcepools/shared".into(),
            expected: Some(3),
            found: Some(4),
        }
        .into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert!(err.to_string().contains("/registry/resourcepools/shared"));

        let err: ApiError = StoreError::Backend("disk full".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_admission_denial_is_unprocessable() {
        let err: ApiError = AdmissionError::ImmutableWhileBound { field: "pool" }.into();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code(), "ADMISSION_DENIED");
    }
}
