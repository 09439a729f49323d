mod auth;
mod error;

use axum::Router;
use std::sync::Arc;

use crate::auth::SessionOrchestrator;
use crate::jwt::TokenCodec;
use crate::rate_limit::RateLimitConfig;

pub use auth::AuthState;
pub use error::ApiError;

/// Create the API router.
pub fn create_api_router(
    sessions: SessionOrchestrator,
    codec: Arc<TokenCodec>,
    rate_limit_config: Arc<RateLimitConfig>,
) -> Router {
    let auth_state = auth::AuthState {
        sessions,
        codec,
        rate_limit_config,
    };

    Router::new().nest("/auth", auth::router(auth_state))
}
