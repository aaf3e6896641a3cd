//! API Error Handling
//!
//! Unified error types and conversion for API responses. Every error body
//! has the shape `{"error": <category>, "details": <text>}`.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chakravyuha_core::dto::obfuscate::ErrorResponse;

use crate::service::artifact_service::ArtifactError;
use crate::service::job_service::JobError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    PayloadTooLarge(String),
    Job(JobError),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, details) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NotFound".to_string(), msg),
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "ValidationError".to_string(), msg)
            }
            ApiError::PayloadTooLarge(msg) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "PayloadTooLarge".to_string(),
                msg,
            ),
            ApiError::Job(err) => {
                let status = match err {
                    JobError::Validation(_) => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.category().to_string(), err.details())
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "InternalError".to_string(),
                    msg,
                )
            }
        };

        (status, Json(ErrorResponse { error, details })).into_response()
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        ApiError::Job(err)
    }
}

/// Over-size bodies keep their 413, every other body problem is a 400
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => ApiError::PayloadTooLarge(rejection.body_text()),
            _ => ApiError::BadRequest(rejection.body_text()),
        }
    }
}

impl From<ArtifactError> for ApiError {
    fn from(err: ArtifactError) -> Self {
        match err {
            ArtifactError::NotFound => ApiError::NotFound(err.to_string()),
            ArtifactError::Io(e) => ApiError::InternalError(format!("Failed to read artifact: {}", e)),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
