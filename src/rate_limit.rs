//! Rate limiting for authentication endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to prevent brute force
//! attacks and mail flooding.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};

use crate::auth::extract_client_ip;
use crate::cli::IpExtractor;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Bucket sizes for each limited endpoint group.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitSettings {
    pub login_per_sec: NonZeroU32,
    pub login_burst: NonZeroU32,
    pub register_per_min: NonZeroU32,
    pub mail_per_min: NonZeroU32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            login_per_sec: NonZeroU32::MIN,
            login_burst: NonZeroU32::new(5).unwrap_or(NonZeroU32::MIN),
            register_per_min: NonZeroU32::new(3).unwrap_or(NonZeroU32::MIN),
            mail_per_min: NonZeroU32::new(3).unwrap_or(NonZeroU32::MIN),
        }
    }
}

impl RateLimitSettings {
    /// Limits high enough to never trigger in tests.
    pub fn generous() -> Self {
        let high = NonZeroU32::new(10_000).unwrap_or(NonZeroU32::MAX);
        Self {
            login_per_sec: high,
            login_burst: high,
            register_per_min: high,
            mail_per_min: high,
        }
    }
}

/// Rate limiting configuration for authentication endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Login: 1 request per second per IP, burst of 5 (prevents brute force)
    pub login: Arc<IpLimiter>,
    /// Registration: 3 requests per minute per IP (prevents spam)
    pub register: Arc<IpLimiter>,
    /// Verification and reset mail: 3 requests per minute per IP
    pub mail: Arc<IpLimiter>,
    ip_extractor: Option<IpExtractor>,
}

impl RateLimitConfig {
    pub fn new(settings: RateLimitSettings, ip_extractor: Option<IpExtractor>) -> Self {
        Self {
            login: Arc::new(RateLimiter::keyed(
                Quota::per_second(settings.login_per_sec).allow_burst(settings.login_burst),
            )),
            register: Arc::new(RateLimiter::keyed(Quota::per_minute(
                settings.register_per_min,
            ))),
            mail: Arc::new(RateLimiter::keyed(Quota::per_minute(settings.mail_per_min))),
            ip_extractor,
        }
    }

    fn check(&self, limiter: &IpLimiter, request: &Request) -> Result<(), Response> {
        let ip = extract_client_ip(request, self.ip_extractor.as_ref()).map_err(|_| {
            (StatusCode::FORBIDDEN, "Unable to determine client IP.").into_response()
        })?;

        limiter.check_key(&ip).map_err(|_| {
            (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests. Please try again later.",
            )
                .into_response()
        })
    }
}

/// Middleware for rate limiting login.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    match config.check(&config.login, &request) {
        Ok(()) => next.run(request).await,
        Err(response) => response,
    }
}

/// Middleware for rate limiting registration.
pub async fn rate_limit_register(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    match config.check(&config.register, &request) {
        Ok(()) => next.run(request).await,
        Err(response) => response,
    }
}

/// Middleware for rate limiting the mail-sending endpoints.
pub async fn rate_limit_mail(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    match config.check(&config.mail, &request) {
        Ok(()) => next.run(request).await,
        Err(response) => response,
    }
}
