#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode, header},
};
use rolodex::auth::MailDispatcher;
use rolodex::ban::BanList;
use rolodex::cli::{ClientIpHeader, IpExtractor};
use rolodex::db::Database;
use rolodex::jwt::{TokenCodec, TokenTtls};
use rolodex::password::{HashCost, PasswordHasher};
use rolodex::rate_limit::RateLimitConfig;
use rolodex::{ServerConfig, create_app};
use serde_json::Value;
use tower::ServiceExt;
use url::Url;

pub const JWT_SECRET: &[u8] = b"test-jwt-secret-that-is-long-enough";
pub const PUBLIC_URL: &str = "http://localhost:8000";
pub const PASSWORD: &str = "correct horse";
/// Socket address of requests that do not set one.
pub const DEFAULT_PEER: [u8; 4] = [198, 51, 100, 10];

/// Mailer that keeps every message in memory.
#[derive(Default)]
pub struct CapturingMailer {
    sent: Mutex<Vec<(String, String)>>,
}

impl CapturingMailer {
    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Token from the most recent link sent to `to`.
    pub fn last_token_for(&self, to: &str) -> Option<String> {
        let prefix = format!("{}/api/email/confirmed_email/", PUBLIC_URL);
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(recipient, _)| recipient == to)
            .and_then(|(_, link)| link.strip_prefix(&prefix).map(str::to_string))
    }
}

impl MailDispatcher for CapturingMailer {
    fn send(&self, to: &str, link: &str) {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), link.to_string()));
    }
}

pub fn test_hasher() -> PasswordHasher {
    PasswordHasher::new(HashCost {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    })
    .expect("Invalid hash cost")
}

pub fn test_codec() -> TokenCodec {
    TokenCodec::new(JWT_SECRET, TokenTtls::default())
}

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub mailer: Arc<CapturingMailer>,
}

async fn build(
    rate_limit: Option<Arc<RateLimitConfig>>,
    bans: Option<Arc<BanList>>,
    no_signup: bool,
) -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let mailer = Arc::new(CapturingMailer::default());

    let config = ServerConfig {
        db: db.clone(),
        jwt_secret: JWT_SECRET.to_vec(),
        token_ttls: TokenTtls::default(),
        hasher: test_hasher(),
        public_url: Url::parse(PUBLIC_URL).expect("Invalid URL"),
        mailer: mailer.clone(),
        rate_limit,
        bans,
        no_signup,
    };

    TestApp {
        app: create_app(&config),
        db,
        mailer,
    }
}

pub async fn create_test_app() -> TestApp {
    build(None, None, false).await
}

/// Rate limits keyed on the socket address.
pub async fn create_rate_limited_app() -> TestApp {
    build(Some(Arc::new(RateLimitConfig::new(None))), None, false).await
}

/// Rate limits keyed on `X-Forwarded-For`, as behind a reverse proxy.
pub async fn create_proxied_app() -> TestApp {
    let extractor = IpExtractor::from(ClientIpHeader::XForwardedFor);
    build(Some(Arc::new(RateLimitConfig::new(Some(extractor)))), None, false).await
}

pub async fn create_no_signup_app() -> TestApp {
    build(None, None, true).await
}

/// Bans 192.168.1.1 and the Googlebot and Python-urllib user agents.
pub async fn create_app_with_bans() -> TestApp {
    let bans = BanList::new(
        vec!["192.168.1.1".parse().unwrap()],
        &["Googlebot", "Python-urllib"],
        None,
    )
    .expect("Invalid ban list");
    build(None, Some(Arc::new(bans)), false).await
}

/// Make the request arrive from `peer`.
pub fn from_peer(mut request: Request<Body>, peer: [u8; 4]) -> Request<Body> {
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from((peer, 4000))));
    request
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn bearer_request(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

pub fn login_request(email: &str, password: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!(
            "username={}&password={}",
            encode(email),
            encode(password)
        )))
        .unwrap()
}

/// Minimal form encoding for test inputs.
fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

impl TestApp {
    /// Send a request and decode the JSON body (`Null` for non-JSON bodies).
    pub async fn send(&self, mut request: Request<Body>) -> (StatusCode, Value) {
        if request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .is_none()
        {
            request = from_peer(request, DEFAULT_PEER);
        }
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn signup(&self, username: &str, email: &str) -> (StatusCode, Value) {
        self.send(json_request(
            "POST",
            "/api/auth/signup",
            serde_json::json!({
                "username": username,
                "email": email,
                "password": PASSWORD,
            }),
        ))
        .await
    }

    pub async fn login(&self, email: &str) -> (StatusCode, Value) {
        self.send(login_request(email, PASSWORD)).await
    }

    /// Redeem the last verification link mailed to `email`.
    pub async fn confirm(&self, email: &str) -> (StatusCode, Value) {
        let token = self
            .mailer
            .last_token_for(email)
            .expect("No verification link sent");
        self.send(
            Request::builder()
                .uri(format!("/api/email/confirmed_email/{}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Sign up, verify and log in. Returns the login response body.
    pub async fn verified_login(&self, username: &str, email: &str) -> Value {
        let (status, _) = self.signup(username, email).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = self.confirm(email).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = self.login(email).await;
        assert_eq!(status, StatusCode::OK);
        body
    }
}
