//! Axum extractors for authentication.

use std::marker::PhantomData;

use axum::{extract::FromRequestParts, http::request::Parts};

use super::bearer::get_bearer_token;
use super::errors::AuthError;
use super::guard::AuthContext;
use super::state::HasAuthState;
use crate::db::UserRole;

/// Set of roles a route accepts.
pub trait RoleConstraint: Send + Sync {
    const ALLOWED: &'static [UserRole];
}

/// Any authenticated user.
pub struct AnyRole;

impl RoleConstraint for AnyRole {
    const ALLOWED: &'static [UserRole] = &[UserRole::User, UserRole::Moderator, UserRole::Admin];
}

/// Moderators and admins.
pub struct StaffOnly;

impl RoleConstraint for StaffOnly {
    const ALLOWED: &'static [UserRole] = &[UserRole::Moderator, UserRole::Admin];
}

pub struct AdminOnly;

impl RoleConstraint for AdminOnly {
    const ALLOWED: &'static [UserRole] = &[UserRole::Admin];
}

/// Extractor for endpoints that require an access token whose role is in `R`.
/// On success the `AuthContext` is also inserted into the request extensions.
pub struct Auth<R: RoleConstraint = AnyRole> {
    pub context: AuthContext,
    _role: PhantomData<R>,
}

impl<S, R> FromRequestParts<S> for Auth<R>
where
    S: HasAuthState + Send + Sync,
    R: RoleConstraint,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = get_bearer_token(&parts.headers);
        let context = state.guard().check(token, R::ALLOWED)?;
        parts.extensions.insert(context.clone());

        Ok(Auth {
            context,
            _role: PhantomData,
        })
    }
}

/// Raw bearer token, for endpoints that validate it themselves (token refresh).
pub struct BearerToken(pub String);

impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        get_bearer_token(&parts.headers)
            .map(|token| BearerToken(token.to_string()))
            .ok_or(AuthError::Unauthenticated)
    }
}
