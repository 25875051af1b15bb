//! JWT token generation and validation.
//!
//! Every token carries a purpose (`typ`) so that a token minted for one use
//! cannot be replayed for another. Expiry is checked here rather than by
//! `jsonwebtoken` so the boundary is exact: a token is valid strictly before
//! `exp`.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::db::UserRole;

/// What a token may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    /// Short-lived token presented on every API call
    Access,
    /// Long-lived token exchanged for a new pair, bound to the user row
    Refresh,
    /// Token embedded in an email verification link
    EmailVerify,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::Access => "access",
            TokenPurpose::Refresh => "refresh",
            TokenPurpose::EmailVerify => "email_verify",
        }
    }
}

/// Signed claims shared by all token purposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// JWT ID, unique per issued token
    pub jti: String,
    /// Subject: user UUID for access/refresh, email address for verification
    pub sub: String,
    /// Role snapshot (access and refresh tokens only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    /// Token purpose
    #[serde(rename = "typ")]
    pub purpose: TokenPurpose,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Access token duration: 15 minutes
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 15 * 60;

/// Refresh token duration: 7 days
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// Verification link duration: 24 hours
pub const EMAIL_VERIFY_DURATION_SECS: u64 = 24 * 60 * 60;

/// Lifetimes for each token purpose, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenTtls {
    pub access: u64,
    pub refresh: u64,
    pub email_verify: u64,
}

impl Default for TokenTtls {
    fn default() -> Self {
        Self {
            access: ACCESS_TOKEN_DURATION_SECS,
            refresh: REFRESH_TOKEN_DURATION_SECS,
            email_verify: EMAIL_VERIFY_DURATION_SECS,
        }
    }
}

impl TokenTtls {
    pub fn for_purpose(&self, purpose: TokenPurpose) -> u64 {
        match purpose {
            TokenPurpose::Access => self.access,
            TokenPurpose::Refresh => self.refresh,
            TokenPurpose::EmailVerify => self.email_verify,
        }
    }
}

/// Result of issuing a token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The JWT token string
    pub token: String,
    /// JWT ID
    pub jti: String,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: u64,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

/// Fields recovered from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedToken {
    pub subject: String,
    pub role: Option<UserRole>,
    pub token_id: String,
    pub issued_at: u64,
    pub expires_at: u64,
}

impl From<Claims> for ParsedToken {
    fn from(claims: Claims) -> Self {
        Self {
            subject: claims.sub,
            role: claims.role,
            token_id: claims.jti,
            issued_at: claims.iat,
            expires_at: claims.exp,
        }
    }
}

/// Signs and verifies purpose-scoped tokens with a single HMAC secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttls: TokenTtls,
}

impl TokenCodec {
    /// Create a codec with the given secret and per-purpose lifetimes.
    pub fn new(secret: &[u8], ttls: TokenTtls) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttls,
        }
    }

    pub fn ttls(&self) -> &TokenTtls {
        &self.ttls
    }

    /// Issue a token with an explicit lifetime.
    pub fn issue(
        &self,
        subject: &str,
        purpose: TokenPurpose,
        role: Option<UserRole>,
        ttl: u64,
    ) -> Result<IssuedToken, TokenError> {
        self.issue_at(subject, purpose, role, ttl, unix_now()?)
    }

    /// Issue a token as if the current time were `now`.
    pub fn issue_at(
        &self,
        subject: &str,
        purpose: TokenPurpose,
        role: Option<UserRole>,
        ttl: u64,
        now: u64,
    ) -> Result<IssuedToken, TokenError> {
        let jti = uuid::Uuid::new_v4().to_string();
        let exp = now.saturating_add(ttl);

        let claims = Claims {
            jti: jti.clone(),
            sub: subject.to_string(),
            role,
            purpose,
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(TokenError::Encoding)?;

        Ok(IssuedToken {
            token,
            jti,
            issued_at: now,
            expires_at: exp,
            duration: ttl,
        })
    }

    /// Issue a token with the configured lifetime for its purpose.
    pub fn issue_for(
        &self,
        subject: &str,
        purpose: TokenPurpose,
        role: Option<UserRole>,
    ) -> Result<IssuedToken, TokenError> {
        self.issue(subject, purpose, role, self.ttls.for_purpose(purpose))
    }

    /// Issue a short-lived access token carrying the user's role.
    pub fn issue_access(&self, user_uuid: &str, role: UserRole) -> Result<IssuedToken, TokenError> {
        self.issue_for(user_uuid, TokenPurpose::Access, Some(role))
    }

    /// Issue a long-lived refresh token.
    pub fn issue_refresh(
        &self,
        user_uuid: &str,
        role: UserRole,
    ) -> Result<IssuedToken, TokenError> {
        self.issue_for(user_uuid, TokenPurpose::Refresh, Some(role))
    }

    /// Issue an email verification token bound to `email`.
    pub fn issue_email_verify(&self, email: &str) -> Result<IssuedToken, TokenError> {
        self.issue_for(email, TokenPurpose::EmailVerify, None)
    }

    /// Verify a token and check that it was issued for `expected`.
    pub fn parse(&self, token: &str, expected: TokenPurpose) -> Result<ParsedToken, TokenError> {
        self.parse_at(token, expected, unix_now()?)
    }

    /// Verify a token as if the current time were `now`.
    pub fn parse_at(
        &self,
        token: &str,
        expected: TokenPurpose,
        now: u64,
    ) -> Result<ParsedToken, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;

        let claims = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| TokenError::InvalidSignature)?
            .claims;

        if now >= claims.exp {
            return Err(TokenError::Expired);
        }

        if claims.purpose != expected {
            return Err(TokenError::PurposeMismatch {
                expected,
                found: claims.purpose,
            });
        }

        Ok(claims.into())
    }
}

fn unix_now() -> Result<u64, TokenError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| TokenError::TimeError)
}

/// Errors that can occur during token operations.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),
    /// Signature does not verify, or the token is not a well-formed JWT
    #[error("Invalid token signature")]
    InvalidSignature,
    #[error("Token has expired")]
    Expired,
    #[error("Token issued for {} used as {}", .found.as_str(), .expected.as_str())]
    PurposeMismatch {
        expected: TokenPurpose,
        found: TokenPurpose,
    },
    #[error("System time error")]
    TimeError,
}
