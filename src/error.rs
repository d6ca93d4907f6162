use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

/// A client message that could not be admitted into the registry.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The payload is not a well-formed registry command.
    #[error("invalid command: {reason}")]
    InvalidCommand {
        /// Human readable cause, echoed back to the client.
        reason: String,
    },
}

impl CommandError {
    /// Build an [`CommandError::InvalidCommand`] from any displayable reason.
    pub fn invalid(reason: impl ToString) -> Self {
        CommandError::InvalidCommand {
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for CommandError {
    fn from(err: serde_json::Error) -> Self {
        CommandError::invalid(err)
    }
}

impl From<ValidationErrors> for CommandError {
    fn from(err: ValidationErrors) -> Self {
        CommandError::invalid(format!("validation failed: {err}"))
    }
}

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The registry actor is gone and cannot answer.
    #[error("room registry unavailable")]
    RegistryUnavailable,
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// A payload could not be encoded.
    #[error("encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
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
            ServiceError::RegistryUnavailable => {
                AppError::ServiceUnavailable("room registry stopped".into())
            }
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Encoding(err) => AppError::Internal(err.to_string()),
        }
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
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
