//! Request-boundary token check and role authorization.

use std::sync::Arc;

use tracing::debug;

use super::errors::AuthError;
use crate::db::UserRole;
use crate::jwt::{TokenCodec, TokenPurpose};

/// Identity attached to an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_uuid: String,
    /// Role as embedded in the access token
    pub role: UserRole,
    pub token_id: String,
    pub issued_at: u64,
}

/// Verifies access tokens and checks roles. Does not touch the database.
#[derive(Clone)]
pub struct AccessGuard {
    codec: Arc<TokenCodec>,
}

impl AccessGuard {
    pub fn new(codec: Arc<TokenCodec>) -> Self {
        Self { codec }
    }

    /// Turn a raw bearer token into an `AuthContext`.
    pub fn authenticate(&self, bearer: Option<&str>) -> Result<AuthContext, AuthError> {
        let token = bearer.ok_or(AuthError::Unauthenticated)?;
        let parsed = self.codec.parse(token, TokenPurpose::Access)?;
        let role = parsed.role.ok_or(AuthError::InvalidSignature)?;

        Ok(AuthContext {
            user_uuid: parsed.subject,
            role,
            token_id: parsed.token_id,
            issued_at: parsed.issued_at,
        })
    }

    pub fn authorize(&self, context: &AuthContext, allowed: &[UserRole]) -> bool {
        allowed.contains(&context.role)
    }

    /// Authenticate, then require one of `allowed`.
    pub fn check(
        &self,
        bearer: Option<&str>,
        allowed: &[UserRole],
    ) -> Result<AuthContext, AuthError> {
        let context = self.authenticate(bearer)?;
        if !self.authorize(&context, allowed) {
            debug!(user = %context.user_uuid, role = context.role.as_str(), "Role not permitted");
            return Err(AuthError::Forbidden);
        }
        Ok(context)
    }
}
