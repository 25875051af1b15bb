//! Authentication error types.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use crate::db::StoreError;
use crate::jwt::TokenError;
use crate::password::PasswordError;

/// Errors produced by the session manager, verification flow and access guard.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Not authenticated")]
    Unauthenticated,
    /// Unknown email or wrong password; the two are not distinguished
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Email not confirmed")]
    NotVerified,
    #[error("Your email is already confirmed")]
    AlreadyVerified,
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    InvalidSignature,
    #[error("Token is not valid for this operation")]
    PurposeMismatch,
    /// Presented refresh token is not the one currently bound to the user
    #[error("Refresh token is no longer valid")]
    StaleToken,
    #[error("Account not found")]
    NotFound,
    #[error("{0} is already taken")]
    Conflict(&'static str),
    #[error("Insufficient permissions")]
    Forbidden,
    #[error("{0}")]
    Validation(String),
    #[error("Internal server error")]
    Internal,
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Unauthenticated
            | AuthError::InvalidCredentials
            | AuthError::NotVerified
            | AuthError::Expired
            | AuthError::InvalidSignature
            | AuthError::PurposeMismatch
            | AuthError::StaleToken => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::NotFound => StatusCode::NOT_FOUND,
            AuthError::Conflict(_) | AuthError::AlreadyVerified => StatusCode::CONFLICT,
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::InvalidSignature => AuthError::InvalidSignature,
            TokenError::Expired => AuthError::Expired,
            TokenError::PurposeMismatch { .. } => AuthError::PurposeMismatch,
            TokenError::Encoding(_) | TokenError::TimeError => {
                error!(error = %e, "Token operation failed");
                AuthError::Internal
            }
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => AuthError::NotFound,
            StoreError::Conflict(field) => AuthError::Conflict(field),
            StoreError::Database(e) => {
                error!(error = %e, "Credential store error");
                AuthError::Internal
            }
        }
    }
}

impl From<PasswordError> for AuthError {
    fn from(e: PasswordError) -> Self {
        error!(error = %e, "Password hashing failed");
        AuthError::Internal
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut response = (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response();

        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }

        response
    }
}
