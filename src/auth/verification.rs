//! Email verification links.

use std::sync::Arc;

use tracing::info;
use url::Url;

use super::errors::AuthError;
use crate::db::Database;
use crate::jwt::{TokenCodec, TokenPurpose};

/// Delivers verification links. Delivery is fire-and-forget.
pub trait MailDispatcher: Send + Sync {
    fn send(&self, to: &str, link: &str);
}

/// Mailer that only records that a message would have been sent.
pub struct LogMailer;

impl MailDispatcher for LogMailer {
    fn send(&self, to: &str, _link: &str) {
        info!(to = %to, "Verification email dispatched");
    }
}

/// Outcome of redeeming a verification token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redemption {
    Verified,
    AlreadyVerified,
}

#[derive(Clone)]
pub struct VerificationFlow {
    db: Database,
    codec: Arc<TokenCodec>,
    mailer: Arc<dyn MailDispatcher>,
    public_url: Url,
}

impl VerificationFlow {
    pub fn new(
        db: Database,
        codec: Arc<TokenCodec>,
        mailer: Arc<dyn MailDispatcher>,
        public_url: Url,
    ) -> Self {
        Self {
            db,
            codec,
            mailer,
            public_url,
        }
    }

    /// Link the user follows to redeem `token`.
    pub fn link_for(&self, token: &str) -> String {
        format!(
            "{}/api/email/confirmed_email/{}",
            self.public_url.as_str().trim_end_matches('/'),
            token
        )
    }

    /// Mint a verification token for `email` and mail the link.
    pub async fn issue_verification_link(&self, email: &str) -> Result<(), AuthError> {
        let user = self
            .db
            .users()
            .get_by_email(email)
            .await?
            .ok_or(AuthError::NotFound)?;

        if user.is_verified {
            return Err(AuthError::AlreadyVerified);
        }

        let issued = self.codec.issue_email_verify(&user.email)?;
        self.mailer.send(&user.email, &self.link_for(&issued.token));
        Ok(())
    }

    /// Mark the token's account as verified. Redeeming twice is not an error.
    pub async fn redeem(&self, token: &str) -> Result<Redemption, AuthError> {
        let parsed = self.codec.parse(token, TokenPurpose::EmailVerify)?;

        let user = self
            .db
            .users()
            .get_by_email(&parsed.subject)
            .await?
            .ok_or(AuthError::NotFound)?;

        if user.is_verified {
            return Ok(Redemption::AlreadyVerified);
        }

        self.db.users().set_verified(&user.email).await?;
        info!(user = %user.uuid, "Email verified");
        Ok(Redemption::Verified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewUser, UserRole};
    use crate::jwt::TokenTtls;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Outbox(Mutex<Vec<(String, String)>>);

    impl MailDispatcher for Outbox {
        fn send(&self, to: &str, link: &str) {
            self.0.lock().unwrap().push((to.to_string(), link.to_string()));
        }
    }

    async fn setup() -> (Database, Arc<TokenCodec>, Arc<Outbox>, VerificationFlow) {
        let db = Database::open(":memory:").await.unwrap();
        db.users()
            .create(NewUser {
                uuid: "uuid-123",
                username: "alice",
                email: "alice@example.com",
                password_hash: "$argon2id$placeholder",
                avatar: None,
            })
            .await
            .unwrap();

        let codec = Arc::new(TokenCodec::new(
            b"test-secret-key-for-testing",
            TokenTtls::default(),
        ));
        let outbox = Arc::new(Outbox::default());
        let flow = VerificationFlow::new(
            db.clone(),
            codec.clone(),
            outbox.clone(),
            Url::parse("https://contacts.example.com/").unwrap(),
        );
        (db, codec, outbox, flow)
    }

    #[tokio::test]
    async fn test_issue_sends_link() {
        let (_db, codec, outbox, flow) = setup().await;

        flow.issue_verification_link("alice@example.com")
            .await
            .unwrap();

        let sent = outbox.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "alice@example.com");

        let prefix = "https://contacts.example.com/api/email/confirmed_email/";
        assert!(sent[0].1.starts_with(prefix));
        let token = &sent[0].1[prefix.len()..];
        let parsed = codec.parse(token, TokenPurpose::EmailVerify).unwrap();
        assert_eq!(parsed.subject, "alice@example.com");
    }

    #[tokio::test]
    async fn test_issue_unknown_or_verified() {
        let (db, _codec, outbox, flow) = setup().await;

        assert!(matches!(
            flow.issue_verification_link("bob@example.com").await,
            Err(AuthError::NotFound)
        ));

        db.users().set_verified("alice@example.com").await.unwrap();
        assert!(matches!(
            flow.issue_verification_link("alice@example.com").await,
            Err(AuthError::AlreadyVerified)
        ));
        assert!(outbox.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_redeem_twice() {
        let (db, codec, _outbox, flow) = setup().await;
        let token = codec.issue_email_verify("alice@example.com").unwrap().token;

        assert_eq!(flow.redeem(&token).await.unwrap(), Redemption::Verified);
        assert_eq!(
            flow.redeem(&token).await.unwrap(),
            Redemption::AlreadyVerified
        );

        let user = db
            .users()
            .get_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(user.is_verified);
    }

    #[tokio::test]
    async fn test_redeem_wrong_purpose_or_unknown() {
        let (_db, codec, _outbox, flow) = setup().await;

        let access = codec.issue_access("uuid-123", UserRole::User).unwrap();
        assert!(matches!(
            flow.redeem(&access.token).await,
            Err(AuthError::PurposeMismatch)
        ));

        let stranger = codec.issue_email_verify("bob@example.com").unwrap();
        assert!(matches!(
            flow.redeem(&stranger.token).await,
            Err(AuthError::NotFound)
        ));

        assert!(matches!(
            flow.redeem("garbage").await,
            Err(AuthError::InvalidSignature)
        ));
    }
}
