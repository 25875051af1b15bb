//! Email verification endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::ApiError;
use crate::auth::{AuthError, Redemption, VerificationFlow};
use crate::rate_limit::{RateLimitConfig, rate_limit_verify_email};

#[derive(Clone)]
pub struct EmailState {
    pub verification: VerificationFlow,
    pub rate_limit: Option<Arc<RateLimitConfig>>,
}

pub fn router(state: EmailState) -> Router {
    let mut request_router = Router::new()
        .route("/request_email", post(request_email))
        .with_state(state.clone());
    if let Some(config) = state.rate_limit.clone() {
        request_router =
            request_router.layer(middleware::from_fn_with_state(config, rate_limit_verify_email));
    }

    Router::new()
        .route("/confirmed_email/{token}", get(confirmed_email))
        .with_state(state)
        .merge(request_router)
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

async fn confirmed_email(
    State(state): State<EmailState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.verification.redeem(&token).await.map_err(|e| match e {
        AuthError::Expired | AuthError::InvalidSignature | AuthError::PurposeMismatch => {
            ApiError::unprocessable("Invalid token for email verification")
        }
        AuthError::NotFound => ApiError::bad_request("Verification error"),
        other => other.into(),
    })?;

    let message = match outcome {
        Redemption::Verified => "Email confirmed",
        Redemption::AlreadyVerified => "Your email is already confirmed",
    };
    Ok(Json(MessageResponse { message }))
}

#[derive(Deserialize)]
struct RequestEmail {
    email: String,
}

/// Send a fresh verification link. The reply is the same whether or not the
/// account exists or is already verified.
async fn request_email(
    State(state): State<EmailState>,
    Json(payload): Json<RequestEmail>,
) -> Result<impl IntoResponse, ApiError> {
    let message = match state
        .verification
        .issue_verification_link(payload.email.trim())
        .await
    {
        Ok(()) | Err(AuthError::NotFound) | Err(AuthError::AlreadyVerified) => {
            "Check your email for confirmation."
        }
        Err(e) => return Err(e.into()),
    };
    Ok(Json(MessageResponse { message }))
}
