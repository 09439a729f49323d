//! Shared error handling for API endpoints.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use crate::auth::AuthError;

/// API error with a stable machine-readable code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn unauthorized(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, code, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
                code: self.code,
            }),
        )
            .into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        if e.is_dependency() {
            error!(error = %e, "Auth dependency failure");
        }

        match e {
            AuthError::EmailNotFound => ApiError::bad_request("email_not_found", e.to_string()),
            AuthError::InvalidCredentials | AuthError::AuthenticationFailed => {
                ApiError::bad_request("authentication_failed", "Invalid email or password")
            }
            AuthError::DuplicateEmail => ApiError::bad_request("duplicate_email", e.to_string()),
            AuthError::Validation(msg) => ApiError::bad_request("validation_failed", msg),
            AuthError::TokenInvalid => ApiError::bad_request("token_invalid", e.to_string()),
            AuthError::TokenExpired => ApiError::bad_request("token_expired", e.to_string()),
            AuthError::TokenPurposeMismatch { .. } => {
                ApiError::bad_request("token_purpose_mismatch", e.to_string())
            }
            AuthError::TokenReplay => ApiError::unauthorized("token_replay", e.to_string()),
            AuthError::AlreadyVerified => {
                ApiError::bad_request("already_verified", e.to_string())
            }
            AuthError::UserNotFound => ApiError::bad_request("user_not_found", e.to_string()),
            AuthError::Database(_) => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "dependency_unavailable",
                "Database error",
            ),
            AuthError::Notifier(_) | AuthError::Timeout(_) => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "dependency_unavailable",
                "Notification could not be sent",
            ),
            AuthError::Hashing(_) | AuthError::Signing(_) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal error",
            ),
        }
    }
}
