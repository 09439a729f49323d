//! Authentication error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::db::SessionError;
use crate::jwt::{TokenError, TokenPurpose};
use crate::notifier::NotifyError;
use crate::password::HashError;

/// Failures of the credential and session flows.
///
/// `EmailNotFound` and `InvalidCredentials` stay internal to login: the
/// orchestrator logs which one happened and reports `AuthenticationFailed`.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no identity is registered for this email")]
    EmailNotFound,
    #[error("password does not match")]
    InvalidCredentials,
    #[error("invalid email or password")]
    AuthenticationFailed,
    #[error("email is already registered")]
    DuplicateEmail,
    #[error("token is invalid")]
    TokenInvalid,
    #[error("token has expired")]
    TokenExpired,
    #[error("token was issued for {found}, not {expected}")]
    TokenPurposeMismatch {
        expected: TokenPurpose,
        found: TokenPurpose,
    },
    #[error("refresh token has already been used or was revoked")]
    TokenReplay,
    #[error("email is already verified")]
    AlreadyVerified,
    #[error("user not found")]
    UserNotFound,
    #[error("{0}")]
    Validation(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error(transparent)]
    Notifier(#[from] NotifyError),
    #[error("failed to sign token: {0}")]
    Signing(String),
    #[error("{0} timed out")]
    Timeout(&'static str),
}

impl AuthError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True for failures of a collaborator (store, notifier, hashing) rather
    /// than of the request itself.
    pub fn is_dependency(&self) -> bool {
        matches!(
            self,
            AuthError::Database(_)
                | AuthError::Hashing(_)
                | AuthError::Notifier(_)
                | AuthError::Signing(_)
                | AuthError::Timeout(_)
        )
    }
}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Encoding(e) => AuthError::Signing(e.to_string()),
            TokenError::Invalid => AuthError::TokenInvalid,
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::PurposeMismatch { expected, found } => {
                AuthError::TokenPurposeMismatch { expected, found }
            }
        }
    }
}

impl From<SessionError> for AuthError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Replay { .. } => AuthError::TokenReplay,
            SessionError::Expired => AuthError::TokenExpired,
            SessionError::OwnerMissing => AuthError::UserNotFound,
            SessionError::Database(e) => AuthError::Database(e),
        }
    }
}

impl From<HashError> for AuthError {
    fn from(e: HashError) -> Self {
        AuthError::Hashing(e.to_string())
    }
}

/// Rejection for requests whose bearer access token is missing or unusable.
#[derive(Debug)]
pub struct BearerRejection {
    code: &'static str,
    message: &'static str,
}

impl BearerRejection {
    pub(super) fn missing() -> Self {
        Self {
            code: "missing_token",
            message: "Missing bearer token",
        }
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl From<TokenError> for BearerRejection {
    fn from(e: TokenError) -> Self {
        let (code, message) = match e {
            TokenError::Expired => ("token_expired", "Access token has expired"),
            TokenError::PurposeMismatch { .. } => {
                ("token_purpose_mismatch", "Token is not an access token")
            }
            TokenError::Invalid | TokenError::Encoding(_) => {
                ("token_invalid", "Invalid access token")
            }
        };
        Self { code, message }
    }
}

impl IntoResponse for BearerRejection {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
            code: &'static str,
        }

        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: self.message,
                code: self.code,
            }),
        )
            .into_response()
    }
}
