//! Registration, login, token refresh and logout.
//!
//! Each user has at most one live refresh token: its `jti` is stored on the
//! user row. Refreshing swaps the binding with a conditional update, so a
//! refresh token is good for exactly one exchange.
//!
//! Presenting a refresh token that is not the current binding revokes the
//! session. This holds however the mismatch is noticed: on the initial read,
//! or by losing the conditional update to a concurrent refresh. Two
//! simultaneous refreshes with the same token therefore leave the user
//! logged out, and the one that won gets a pair whose refresh token is
//! already dead.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use super::errors::AuthError;
use crate::db::{Database, NewUser, User};
use crate::gravatar::gravatar_url;
use crate::jwt::{TokenCodec, TokenPurpose};
use crate::password::PasswordHasher;

const MIN_USERNAME_LENGTH: usize = 3;
const MAX_USERNAME_LENGTH: usize = 32;
const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;
const MAX_EMAIL_LENGTH: usize = 254;

/// Access and refresh tokens returned by login and refresh.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

#[derive(Clone)]
pub struct SessionManager {
    db: Database,
    codec: Arc<TokenCodec>,
    hasher: PasswordHasher,
}

impl SessionManager {
    pub fn new(db: Database, codec: Arc<TokenCodec>, hasher: PasswordHasher) -> Self {
        Self { db, codec, hasher }
    }

    /// Create an unverified account with the `user` role.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        let username = username.trim();
        let email = email.trim();
        validate_username(username)?;
        validate_email(email)?;
        validate_password(password)?;

        let password_hash = self.hash_password(password).await?;
        let uuid = uuid::Uuid::new_v4().to_string();
        let avatar = gravatar_url(email);

        let id = self
            .db
            .users()
            .create(NewUser {
                uuid: &uuid,
                username,
                email,
                password_hash: &password_hash,
                avatar: Some(&avatar),
            })
            .await?;

        let user = self
            .db
            .users()
            .get_by_id(id)
            .await?
            .ok_or(AuthError::Internal)?;

        info!(user = %user.uuid, "Account registered");
        Ok(user)
    }

    /// Check credentials and start a session.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let user = self.db.users().get_by_email(email.trim()).await?;

        let Some(user) = user else {
            self.verify_absent(password).await?;
            warn!("Login failed: unknown account");
            return Err(AuthError::InvalidCredentials);
        };

        if !self.verify_password(password, &user.password_hash).await? {
            warn!(user = %user.uuid, "Login failed: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_verified {
            return Err(AuthError::NotVerified);
        }

        let (pair, refresh_jti) = self.issue_pair(&user)?;
        self.db
            .users()
            .set_refresh_token(user.id, Some(&refresh_jti))
            .await?;

        info!(user = %user.uuid, "Logged in");
        Ok(pair)
    }

    /// Exchange the current refresh token for a new pair.
    pub async fn refresh(&self, presented: &str) -> Result<TokenPair, AuthError> {
        let parsed = self.codec.parse(presented, TokenPurpose::Refresh)?;

        let user = self
            .db
            .users()
            .get_by_uuid(&parsed.subject)
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        if user.refresh_token_id.as_deref() != Some(parsed.token_id.as_str()) {
            warn!(user = %user.uuid, "Stale refresh token presented, revoking session");
            self.db.users().set_refresh_token(user.id, None).await?;
            return Err(AuthError::StaleToken);
        }

        let (pair, refresh_jti) = self.issue_pair(&user)?;
        let rotated = self
            .db
            .users()
            .rotate_refresh_token(user.id, &parsed.token_id, &refresh_jti)
            .await?;

        if !rotated {
            warn!(user = %user.uuid, "Refresh token rotated concurrently, revoking session");
            self.db.users().set_refresh_token(user.id, None).await?;
            return Err(AuthError::StaleToken);
        }

        Ok(pair)
    }

    /// Clear the refresh binding. Unknown users and cleared bindings are fine.
    pub async fn logout(&self, user_uuid: &str) -> Result<(), AuthError> {
        if let Some(user) = self.db.users().get_by_uuid(user_uuid).await? {
            self.db.users().set_refresh_token(user.id, None).await?;
            info!(user = %user.uuid, "Logged out");
        }
        Ok(())
    }

    /// Issue an access/refresh pair from the user's current role.
    /// Returns the pair and the refresh token's id.
    fn issue_pair(&self, user: &User) -> Result<(TokenPair, String), AuthError> {
        let access = self.codec.issue_access(&user.uuid, user.role)?;
        let refresh = self.codec.issue_refresh(&user.uuid, user.role)?;

        let pair = TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
            token_type: "bearer",
            expires_in: access.duration,
        };
        Ok((pair, refresh.jti))
    }

    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let digest = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| {
                error!(error = %e, "Password hashing task failed");
                AuthError::Internal
            })??;
        Ok(digest)
    }

    async fn verify_password(&self, password: &str, digest: &str) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let digest = digest.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &digest))
            .await
            .map_err(|e| {
                error!(error = %e, "Password verification task failed");
                AuthError::Internal
            })
    }

    async fn verify_absent(&self, password: &str) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.verify_absent(&password))
            .await
            .map_err(|e| {
                error!(error = %e, "Password verification task failed");
                AuthError::Internal
            })
    }
}

fn validate_username(username: &str) -> Result<(), AuthError> {
    let len = username.chars().count();
    if len < MIN_USERNAME_LENGTH || len > MAX_USERNAME_LENGTH {
        return Err(AuthError::Validation(format!(
            "Username must be between {} and {} characters",
            MIN_USERNAME_LENGTH, MAX_USERNAME_LENGTH
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(AuthError::Validation(
            "Username can only contain letters, digits, '_', '-' and '.'".into(),
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), AuthError> {
    let valid = email.len() <= MAX_EMAIL_LENGTH
        && !email.chars().any(char::is_whitespace)
        && match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            }
            None => false,
        };

    if valid {
        Ok(())
    } else {
        Err(AuthError::Validation("Invalid email address".into()))
    }
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LENGTH || len > MAX_PASSWORD_LENGTH {
        return Err(AuthError::Validation(format!(
            "Password must be between {} and {} characters",
            MIN_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH
        )));
    }
    Ok(())
}
