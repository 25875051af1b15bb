//! Signup, login, token refresh and logout endpoints.

use axum::{
    Extension, Form, Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use super::error::ApiError;
use crate::auth::{
    AccessGuard, AnyRole, Auth, AuthContext, BearerToken, SessionManager, VerificationFlow,
};
use crate::db::UserRole;
use crate::impl_has_auth_state;
use crate::rate_limit::{RateLimitConfig, rate_limit_login, rate_limit_signup};

#[derive(Clone)]
pub struct AuthState {
    pub guard: AccessGuard,
    pub sessions: SessionManager,
    pub verification: VerificationFlow,
    pub no_signup: bool,
    pub rate_limit: Option<Arc<RateLimitConfig>>,
}

impl_has_auth_state!(AuthState);

pub fn router(state: AuthState) -> Router {
    let mut login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone());
    if let Some(config) = state.rate_limit.clone() {
        login_router = login_router.layer(middleware::from_fn_with_state(config, rate_limit_login));
    }

    let session_router = Router::new()
        .route("/refresh_token", get(refresh_token))
        .route("/logout", post(logout))
        .route("/secret", get(secret))
        .with_state(state.clone());

    let router = Router::new().merge(login_router).merge(session_router);

    if state.no_signup {
        return router;
    }

    let mut signup_router = Router::new()
        .route("/signup", post(signup))
        .with_state(state.clone());
    if let Some(config) = state.rate_limit {
        signup_router =
            signup_router.layer(middleware::from_fn_with_state(config, rate_limit_signup));
    }

    router.merge(signup_router)
}

#[derive(Deserialize)]
struct SignupRequest {
    username: String,
    email: String,
    password: String,
}

#[derive(Serialize)]
struct SignupResponse {
    uuid: String,
    username: String,
    email: String,
    role: UserRole,
    is_verified: bool,
    avatar: Option<String>,
    detail: &'static str,
}

/// Create an account and send the first verification link.
async fn signup(
    State(state): State<AuthState>,
    Json(payload): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .sessions
        .register(&payload.username, &payload.email, &payload.password)
        .await?;

    // The account exists either way; the user can ask for another link
    if let Err(e) = state
        .verification
        .issue_verification_link(&user.email)
        .await
    {
        warn!(user = %user.uuid, error = %e, "Failed to send verification link");
    }

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            uuid: user.uuid,
            username: user.username,
            email: user.email,
            role: user.role,
            is_verified: user.is_verified,
            avatar: user.avatar,
            detail: "User successfully created. Check your email for confirmation.",
        }),
    ))
}

/// OAuth2 password-style form; `username` carries the email address.
#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

async fn login(
    State(state): State<AuthState>,
    Form(form): Form<LoginForm>,
) -> Result<impl IntoResponse, ApiError> {
    let pair = state.sessions.login(&form.username, &form.password).await?;
    Ok(Json(pair))
}

async fn refresh_token(
    State(state): State<AuthState>,
    BearerToken(token): BearerToken,
) -> Result<impl IntoResponse, ApiError> {
    let pair = state.sessions.refresh(&token).await?;
    Ok(Json(pair))
}

async fn logout(
    State(state): State<AuthState>,
    auth: Auth<AnyRole>,
) -> Result<impl IntoResponse, ApiError> {
    state.sessions.logout(&auth.context.user_uuid).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
struct SecretResponse {
    message: &'static str,
    owner: String,
}

/// `Auth` runs first and leaves the context in the request extensions.
async fn secret(
    _auth: Auth<AnyRole>,
    Extension(context): Extension<AuthContext>,
) -> impl IntoResponse {
    Json(SecretResponse {
        message: "secret router",
        owner: context.user_uuid,
    })
}
