//! Rate limiting for authentication and profile endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to prevent brute force
//! and signup/email spam.

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

const LOGIN_PER_SEC: NonZeroU32 = NonZeroU32::new(1).unwrap();
const LOGIN_BURST: NonZeroU32 = NonZeroU32::new(5).unwrap();
const SIGNUP_PER_MIN: NonZeroU32 = NonZeroU32::new(3).unwrap();
const VERIFY_EMAIL_PER_MIN: NonZeroU32 = NonZeroU32::new(3).unwrap();
// One token every 20 seconds, no burst.
const AVATAR_PER_MIN: NonZeroU32 = NonZeroU32::new(3).unwrap();
const AVATAR_BURST: NonZeroU32 = NonZeroU32::new(1).unwrap();

/// Rate limiting configuration.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Login attempts: burst of 5, then 1 per second per IP
    pub login: Arc<IpLimiter>,
    /// Account creation: 3 per minute per IP
    pub signup: Arc<IpLimiter>,
    /// Verification email requests: 3 per minute per IP
    pub verify_email: Arc<IpLimiter>,
    /// Avatar changes: 1 per 20 seconds per IP
    pub avatar: Arc<IpLimiter>,
    /// Where the client IP comes from; `None` means the socket address
    pub ip_extractor: Option<IpExtractor>,
}

impl RateLimitConfig {
    pub fn new(ip_extractor: Option<IpExtractor>) -> Self {
        Self {
            login: Arc::new(RateLimiter::keyed(
                Quota::per_second(LOGIN_PER_SEC).allow_burst(LOGIN_BURST),
            )),
            signup: Arc::new(RateLimiter::keyed(Quota::per_minute(SIGNUP_PER_MIN))),
            verify_email: Arc::new(RateLimiter::keyed(Quota::per_minute(VERIFY_EMAIL_PER_MIN))),
            avatar: Arc::new(RateLimiter::keyed(
                Quota::per_minute(AVATAR_PER_MIN).allow_burst(AVATAR_BURST),
            )),
            ip_extractor,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(None)
    }
}

async fn check(
    config: &RateLimitConfig,
    limiter: &IpLimiter,
    message: &'static str,
    request: Request,
    next: Next,
) -> Response {
    let ip = match extract_client_ip(&request, config.ip_extractor.as_ref()) {
        Ok(ip) => ip,
        Err(_) => {
            return (StatusCode::FORBIDDEN, "Unable to determine client IP.").into_response();
        }
    };

    match limiter.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            tracing::warn!(ip = %ip, "Rate limit exceeded");
            (StatusCode::TOO_MANY_REQUESTS, message).into_response()
        }
    }
}

/// Middleware for rate limiting login attempts.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    check(
        &config,
        &config.login,
        "Too many login attempts. Please wait before trying again.",
        request,
        next,
    )
    .await
}

/// Middleware for rate limiting account creation.
pub async fn rate_limit_signup(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    check(
        &config,
        &config.signup,
        "Too many signup attempts. Please wait before trying again.",
        request,
        next,
    )
    .await
}

/// Middleware for rate limiting verification email requests.
pub async fn rate_limit_verify_email(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    check(
        &config,
        &config.verify_email,
        "Too many requests. Please try again later.",
        request,
        next,
    )
    .await
}

/// Middleware for rate limiting avatar changes.
pub async fn rate_limit_avatar(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    check(
        &config,
        &config.avatar,
        "Too many avatar changes. Please try again later.",
        request,
        next,
    )
    .await
}
