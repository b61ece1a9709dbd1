use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::dao::{models::PollEntity, poll_store::StorageError};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Missing or invalid credential, or wrong role for the operation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested poll was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// The voter already has a recorded vote on this poll.
    #[error("duplicate vote: {0}")]
    DuplicateVote(String),
    /// The poll deadline elapsed; carries the force-ended snapshot so the
    /// caller can still broadcast the forced end.
    #[error("poll deadline has elapsed")]
    Expired(Box<PollEntity>),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

/// Machine-readable error discriminant sent alongside gateway error events,
/// so a client can render "already voted" distinctly from a generic failure.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// Malformed input.
    Validation,
    /// Referenced poll does not exist.
    NotFound,
    /// Operation not legal in the poll's current state.
    InvalidState,
    /// Voter already recorded on this poll.
    DuplicateVote,
    /// Credential or role rejection.
    Unauthorized,
    /// Persistence failure.
    Unavailable,
}

impl From<&ServiceError> for ErrorCode {
    fn from(err: &ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(_) | ServiceError::Degraded => ErrorCode::Unavailable,
            ServiceError::Unauthorized(_) => ErrorCode::Unauthorized,
            ServiceError::InvalidInput(_) => ErrorCode::Validation,
            ServiceError::InvalidState(_) | ServiceError::Expired(_) => ErrorCode::InvalidState,
            ServiceError::NotFound(_) => ErrorCode::NotFound,
            ServiceError::DuplicateVote(_) => ErrorCode::DuplicateVote,
        }
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Missing or invalid credential, or insufficient role.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::DuplicateVote(message) => AppError::Conflict(message),
            ServiceError::Expired(_) => AppError::Conflict("poll deadline has elapsed".into()),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {err}"))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
