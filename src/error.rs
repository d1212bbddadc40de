use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::db::StoreError;

/* -------------------------
   Engine errors
--------------------------*/

/// Typed outcome of a rejected engine command.
///
/// Every variant is recoverable at the call site and carries only a
/// human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("deadline passed: {0}")]
    DeadlinePassed(String),

    #[error("duplicate case: {0}")]
    DuplicateCase(String),

    #[error("validation error: {0}")]
    Validation(String),
}

impl LifecycleError {
    pub fn code(&self) -> &'static str {
        match self {
            LifecycleError::NotFound(_) => "NOT_FOUND",
            LifecycleError::InvalidTransition(_) => "INVALID_TRANSITION",
            LifecycleError::DeadlinePassed(_) => "DEADLINE_PASSED",
            LifecycleError::DuplicateCase(_) => "DUPLICATE_CASE",
            LifecycleError::Validation(_) => "VALIDATION_ERROR",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            LifecycleError::NotFound(m)
            | LifecycleError::InvalidTransition(m)
            | LifecycleError::DeadlinePassed(m)
            | LifecycleError::DuplicateCase(m)
            | LifecycleError::Validation(m) => m,
        }
    }

    /// Losing side of a race between two transitions on the same entity.
    pub fn is_race_outcome(&self) -> bool {
        matches!(
            self,
            LifecycleError::InvalidTransition(_) | LifecycleError::DeadlinePassed(_)
        )
    }
}

/* -------------------------
   HTTP errors
--------------------------*/

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorObject,
}

#[derive(Debug, Serialize)]
pub struct ErrorObject {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(&'static str, String),
    Forbidden(&'static str, String),
    BadRequest(&'static str, String),
    NotFound(&'static str, String),
    Conflict(&'static str, String),
    Internal(String),
}

impl ApiError {
    pub fn invalid_credentials() -> Self {
        ApiError::Unauthorized("INVALID_CREDENTIALS", "Email or password is incorrect".into())
    }

    pub fn session_expired() -> Self {
        ApiError::Unauthorized("SESSION_EXPIRED", "Session expired".into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden("FORBIDDEN", message.into())
    }

    fn to_error_response(code: &str, message: &str) -> Json<ErrorResponse> {
        Json(ErrorResponse {
            error: ErrorObject {
                code: code.to_string(),
                message: message.to_string(),
            },
        })
    }
}

impl From<LifecycleError> for ApiError {
    fn from(e: LifecycleError) -> Self {
        let code = e.code();
        let msg = e.message().to_string();
        match e {
            LifecycleError::NotFound(_) => ApiError::NotFound(code, msg),
            LifecycleError::Validation(_) => ApiError::BadRequest(code, msg),
            LifecycleError::InvalidTransition(_)
            | LifecycleError::DeadlinePassed(_)
            | LifecycleError::DuplicateCase(_) => ApiError::Conflict(code, msg),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Internal(format!("store error: {e}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(code, msg) => {
                (StatusCode::UNAUTHORIZED, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Forbidden(code, msg) => {
                (StatusCode::FORBIDDEN, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::BadRequest(code, msg) => {
                (StatusCode::BAD_REQUEST, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::NotFound(code, msg) => {
                (StatusCode::NOT_FOUND, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Conflict(code, msg) => {
                (StatusCode::CONFLICT, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::to_error_response("INTERNAL", &msg),
                )
                    .into_response()
            }
        }
    }
}
