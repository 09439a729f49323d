use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::ApiError;
use crate::auth::{AccessAuth, AuthError, Registration, SessionOrchestrator, TokenPair};
use crate::db::{Identity, UserRole};
use crate::impl_has_token_codec;
use crate::jwt::TokenCodec;
use crate::rate_limit::{RateLimitConfig, rate_limit_login, rate_limit_mail, rate_limit_register};

#[derive(Clone)]
pub struct AuthState {
    pub sessions: SessionOrchestrator,
    pub codec: Arc<TokenCodec>,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

impl_has_token_codec!(AuthState);

pub fn router(state: AuthState) -> Router {
    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_login,
        ));

    let register_router = Router::new()
        .route("/register", post(register))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_register,
        ));

    let mail_router = Router::new()
        .route("/send-verification-email", post(send_verification_email))
        .route("/send-password-reset", post(send_password_reset))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_mail,
        ));

    let session_router = Router::new()
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/verify-email", post(verify_email))
        .route("/reset-password", post(reset_password))
        .with_state(state);

    Router::new()
        .merge(login_router)
        .merge(register_router)
        .merge(mail_router)
        .merge(session_router)
}

#[derive(Deserialize)]
struct RegisterRequest {
    full_name: String,
    email: String,
    phone: String,
    password: String,
}

#[derive(Serialize)]
struct IdentityResponse {
    uuid: String,
    full_name: String,
    email: String,
    phone: String,
    role: UserRole,
    is_verified: bool,
}

impl From<Identity> for IdentityResponse {
    fn from(identity: Identity) -> Self {
        Self {
            uuid: identity.uuid,
            full_name: identity.full_name,
            email: identity.email,
            phone: identity.phone,
            role: identity.role,
            is_verified: identity.verified,
        }
    }
}

async fn register(
    State(state): State<AuthState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = state
        .sessions
        .register(&Registration {
            full_name: &payload.full_name,
            email: &payload.email,
            phone: &payload.phone,
            password: &payload.password,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(IdentityResponse::from(identity))))
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let pair = state
        .sessions
        .login(&payload.email, &payload.password)
        .await?;
    Ok(Json(pair))
}

#[derive(Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

async fn refresh(
    State(state): State<AuthState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let pair = state
        .sessions
        .refresh(&payload.refresh_token)
        .await
        .map_err(|e| match e {
            // Every refresh-token failure is an authentication failure here.
            AuthError::TokenExpired => {
                ApiError::unauthorized("token_expired", "Refresh token has expired")
            }
            AuthError::UserNotFound => {
                ApiError::unauthorized("token_replay", "Refresh token is no longer valid")
            }
            other => other.into(),
        })?;
    Ok(Json(pair))
}

async fn logout(
    State(state): State<AuthState>,
    AccessAuth(claims): AccessAuth,
) -> Result<StatusCode, ApiError> {
    state.sessions.logout(&claims.sub).await?;
    Ok(StatusCode::OK)
}

#[derive(Deserialize)]
struct EmailRequest {
    email: String,
}

async fn send_verification_email(
    State(state): State<AuthState>,
    Json(payload): Json<EmailRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .sessions
        .send_verification_email(&payload.email)
        .await?;
    Ok(StatusCode::OK)
}

#[derive(Deserialize)]
struct VerifyEmailRequest {
    token: String,
}

#[derive(Serialize)]
struct VerifyEmailResponse {
    email: String,
    is_verified: bool,
}

async fn verify_email(
    State(state): State<AuthState>,
    Json(payload): Json<VerifyEmailRequest>,
) -> Result<Json<VerifyEmailResponse>, ApiError> {
    let identity = state.sessions.verify_email(&payload.token).await?;
    Ok(Json(VerifyEmailResponse {
        email: identity.email,
        is_verified: identity.verified,
    }))
}

async fn send_password_reset(
    State(state): State<AuthState>,
    Json(payload): Json<EmailRequest>,
) -> Result<StatusCode, ApiError> {
    state.sessions.send_password_reset(&payload.email).await?;
    Ok(StatusCode::OK)
}

#[derive(Deserialize)]
struct ResetPasswordRequest {
    token: String,
    new_password: String,
}

async fn reset_password(
    State(state): State<AuthState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .sessions
        .reset_password(&payload.token, &payload.new_password)
        .await?;
    Ok(StatusCode::OK)
}
