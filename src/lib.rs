pub mod api;
pub mod auth;
pub mod ban;
pub mod cli;
pub mod db;
pub mod gravatar;
pub mod jwt;
pub mod password;
pub mod rate_limit;

use api::{ApiServices, create_api_router, healthchecker};
use auth::{AccessGuard, MailDispatcher, SessionManager, VerificationFlow};
use axum::{Router, middleware, routing::get};
use ban::{BanList, reject_banned};
use db::Database;
use jwt::{TokenCodec, TokenTtls};
use password::PasswordHasher;
use rate_limit::RateLimitConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use url::Url;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret for signing tokens. Changing it invalidates every outstanding token.
    pub jwt_secret: Vec<u8>,
    pub token_ttls: TokenTtls,
    pub hasher: PasswordHasher,
    /// Externally reachable base URL, used to build verification links
    pub public_url: Url,
    pub mailer: Arc<dyn MailDispatcher>,
    /// Per-IP limits on auth endpoints; `None` disables them
    pub rate_limit: Option<Arc<RateLimitConfig>>,
    /// Clients rejected before routing; `None` bans nobody
    pub bans: Option<Arc<BanList>>,
    /// Whether new user signups are disabled
    pub no_signup: bool,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let codec = Arc::new(TokenCodec::new(&config.jwt_secret, config.token_ttls));

    let services = ApiServices {
        db: config.db.clone(),
        guard: AccessGuard::new(codec.clone()),
        sessions: SessionManager::new(config.db.clone(), codec.clone(), config.hasher.clone()),
        verification: VerificationFlow::new(
            config.db.clone(),
            codec,
            config.mailer.clone(),
            config.public_url.clone(),
        ),
        rate_limit: config.rate_limit.clone(),
        no_signup: config.no_signup,
    };

    let mut app = Router::new()
        .route("/healthchecker", get(healthchecker))
        .nest("/api", create_api_router(services));

    if let Some(bans) = config.bans.clone() {
        app = app.layer(middleware::from_fn_with_state(bans, reject_banned));
    }

    // Any origin, method and header, without credentials
    app.layer(CorsLayer::permissive())
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}
