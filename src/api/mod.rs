mod auth;
mod email;
mod error;
mod users;

use axum::{Json, Router, response::IntoResponse};
use serde::Serialize;
use std::sync::Arc;

use crate::auth::{AccessGuard, SessionManager, VerificationFlow};
use crate::db::Database;
use crate::rate_limit::RateLimitConfig;

pub use error::ApiError;

/// Shared services the API routers are built from.
#[derive(Clone)]
pub struct ApiServices {
    pub db: Database,
    pub guard: AccessGuard,
    pub sessions: SessionManager,
    pub verification: VerificationFlow,
    pub rate_limit: Option<Arc<RateLimitConfig>>,
    pub no_signup: bool,
}

/// Create the API router.
pub fn create_api_router(services: ApiServices) -> Router {
    let auth_state = auth::AuthState {
        guard: services.guard.clone(),
        sessions: services.sessions,
        verification: services.verification.clone(),
        no_signup: services.no_signup,
        rate_limit: services.rate_limit.clone(),
    };

    let email_state = email::EmailState {
        verification: services.verification,
        rate_limit: services.rate_limit.clone(),
    };

    let users_state = users::UsersState {
        db: services.db,
        guard: services.guard,
        rate_limit: services.rate_limit.clone(),
    };

    Router::new()
        .nest("/auth", auth::router(auth_state))
        .nest("/email", email::router(email_state))
        .nest("/users", users::router(users_state))
}

#[derive(Serialize)]
struct HealthResponse {
    message: &'static str,
}

/// Liveness check, served outside `/api`.
pub async fn healthchecker() -> impl IntoResponse {
    Json(HealthResponse {
        message: "Rolodex is up and running",
    })
}
