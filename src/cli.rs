//! CLI argument parsing, validation, and startup helpers.

use std::net::IpAddr;
use std::sync::Arc;

use crate::ServerConfig;
use crate::auth::LogMailer;
use crate::ban::BanList;
use crate::db::{Database, UserRole};
use crate::jwt::{
    ACCESS_TOKEN_DURATION_SECS, EMAIL_VERIFY_DURATION_SECS, REFRESH_TOKEN_DURATION_SECS,
    TokenTtls,
};
use crate::password::{HashCost, PasswordHasher};
use crate::rate_limit::RateLimitConfig;
use clap::Parser;
use tracing::{error, info};
use url::Url;

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Header a reverse proxy uses to pass on the client IP.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientIpHeader {
    /// `X-Forwarded-For`, last entry (the address the proxy saw)
    XForwardedFor,
    /// `X-Real-IP`
    XRealIp,
    /// `CF-Connecting-IP` (Cloudflare)
    CfConnectingIp,
}

/// Reads the client IP from a header set by a trusted reverse proxy.
#[derive(Clone, Copy, Debug)]
pub struct IpExtractor {
    pub header_name: &'static str,
    parse: fn(&str) -> Result<String, &'static str>,
}

impl IpExtractor {
    /// Parse the client IP out of the header value.
    pub fn extract(&self, value: &str) -> Result<String, &'static str> {
        (self.parse)(value)
    }
}

impl From<ClientIpHeader> for IpExtractor {
    fn from(header: ClientIpHeader) -> Self {
        match header {
            ClientIpHeader::XForwardedFor => IpExtractor {
                header_name: "x-forwarded-for",
                parse: parse_forwarded_for,
            },
            ClientIpHeader::XRealIp => IpExtractor {
                header_name: "x-real-ip",
                parse: parse_ip,
            },
            ClientIpHeader::CfConnectingIp => IpExtractor {
                header_name: "cf-connecting-ip",
                parse: parse_ip,
            },
        }
    }
}

fn parse_ip(value: &str) -> Result<String, &'static str> {
    value
        .trim()
        .parse::<IpAddr>()
        .map(|ip| ip.to_string())
        .map_err(|_| "IP header does not contain an IP address")
}

// Earlier entries are whatever the client sent; the proxy appends the last one.
fn parse_forwarded_for(value: &str) -> Result<String, &'static str> {
    let last = value.rsplit(',').next().ok_or("IP header is empty")?;
    parse_ip(last)
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Rolodex",
    about = "Contact manager backend: accounts, sessions and access control"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8000")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE_PATH", default_value = "rolodex.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Public base URL, used in verification links (e.g. "https://contacts.example.com")
    #[arg(long, env = "PUBLIC_URL", default_value = "http://localhost:8000")]
    pub public_url: String,

    /// Access token lifetime in seconds
    #[arg(long, env = "ACCESS_TTL_SECS", default_value_t = ACCESS_TOKEN_DURATION_SECS)]
    pub access_ttl_secs: u64,

    /// Refresh token lifetime in seconds
    #[arg(long, env = "REFRESH_TTL_SECS", default_value_t = REFRESH_TOKEN_DURATION_SECS)]
    pub refresh_ttl_secs: u64,

    /// Verification link lifetime in seconds
    #[arg(long, env = "VERIFY_TTL_SECS", default_value_t = EMAIL_VERIFY_DURATION_SECS)]
    pub verify_ttl_secs: u64,

    /// Argon2 memory cost in KiB
    #[arg(long, env = "HASH_MEMORY_KIB", default_value_t = HashCost::default().memory_kib)]
    pub hash_memory_kib: u32,

    /// Argon2 iterations
    #[arg(long, env = "HASH_ITERATIONS", default_value_t = HashCost::default().iterations)]
    pub hash_iterations: u32,

    /// Argon2 parallelism
    #[arg(long, env = "HASH_PARALLELISM", default_value_t = HashCost::default().parallelism)]
    pub hash_parallelism: u32,

    /// Disable new user signups
    #[arg(long)]
    pub no_signup: bool,

    /// Disable per-IP rate limiting on auth endpoints
    #[arg(long)]
    pub no_rate_limit: bool,

    /// Read the client IP from this proxy header instead of the socket address.
    /// Only set this behind a reverse proxy that overwrites the header
    #[arg(long, env = "IP_HEADER")]
    pub ip_header: Option<ClientIpHeader>,

    /// Client IPs to reject with 403 (comma separated)
    #[arg(long, env = "BANNED_IPS", value_delimiter = ',')]
    pub ban_ip: Vec<IpAddr>,

    /// User-Agent regex patterns to reject with 403 (comma separated)
    #[arg(long, env = "BANNED_USER_AGENTS", value_delimiter = ',')]
    pub ban_user_agent: Vec<String>,

    /// Grant the admin role to the account with this email on startup
    #[arg(long, value_name = "EMAIL")]
    pub promote_admin: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Parse and validate the public URL.
/// Returns None and logs an error if validation fails.
pub fn validate_public_url(public_url: &str) -> Option<Url> {
    let url = match Url::parse(public_url) {
        Ok(url) => url,
        Err(e) => {
            error!(url = %public_url, error = %e, "Invalid public URL");
            return None;
        }
    };

    if !matches!(url.scheme(), "http" | "https") {
        error!(url = %public_url, "Public URL must use http or https");
        return None;
    }

    Some(url)
}

/// Handle the --promote-admin flag: give an existing account the admin role.
/// The account must have verified its email first.
pub async fn handle_promote_admin(db: &Database, email: &str) -> Result<(), String> {
    let user = db
        .users()
        .get_by_email(email)
        .await
        .map_err(|e| format!("Failed to look up {}: {}", email, e))?
        .ok_or_else(|| format!("No account with email {}", email))?;

    if !user.is_verified {
        return Err(format!("Account {} has not verified its email", email));
    }

    if user.role == UserRole::Admin {
        info!(user = %user.uuid, "Account is already an admin");
        return Ok(());
    }

    db.users()
        .set_role(user.id, UserRole::Admin)
        .await
        .map_err(|e| format!("Failed to promote {}: {}", email, e))?;

    info!(user = %user.uuid, "Account promoted to admin");
    Ok(())
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    public_url: Url,
    jwt_secret: String,
) -> Result<ServerConfig, String> {
    let hasher = PasswordHasher::new(HashCost {
        memory_kib: args.hash_memory_kib,
        iterations: args.hash_iterations,
        parallelism: args.hash_parallelism,
    })
    .map_err(|e| e.to_string())?;

    for (name, ttl) in [
        ("access", args.access_ttl_secs),
        ("refresh", args.refresh_ttl_secs),
        ("verification", args.verify_ttl_secs),
    ] {
        if ttl == 0 {
            return Err(format!("The {} token lifetime must be positive", name));
        }
    }

    let ip_extractor = args.ip_header.map(IpExtractor::from);

    let rate_limit = if args.no_rate_limit {
        None
    } else {
        Some(Arc::new(RateLimitConfig::new(ip_extractor)))
    };

    let bans = if args.ban_ip.is_empty() && args.ban_user_agent.is_empty() {
        None
    } else {
        let bans = BanList::new(
            args.ban_ip.clone(),
            args.ban_user_agent.as_slice(),
            ip_extractor,
        )
        .map_err(|e| format!("Invalid banned user agent pattern: {}", e))?;
        Some(Arc::new(bans))
    };

    Ok(ServerConfig {
        db,
        jwt_secret: jwt_secret.into_bytes(),
        token_ttls: TokenTtls {
            access: args.access_ttl_secs,
            refresh: args.refresh_ttl_secs,
            email_verify: args.verify_ttl_secs,
        },
        hasher,
        public_url,
        mailer: Arc::new(LogMailer),
        rate_limit,
        bans,
        no_signup: args.no_signup,
    })
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["rolodex"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_defaults() {
        let args = args(&[]);
        assert_eq!(args.access_ttl_secs, ACCESS_TOKEN_DURATION_SECS);
        assert_eq!(args.refresh_ttl_secs, REFRESH_TOKEN_DURATION_SECS);
        assert!(!args.no_signup);
        assert!(args.promote_admin.is_none());
        assert!(args.ip_header.is_none());
        assert!(args.ban_ip.is_empty());
    }

    #[test]
    fn test_forwarded_for_uses_last_entry() {
        let extractor = IpExtractor::from(ClientIpHeader::XForwardedFor);
        assert_eq!(extractor.header_name, "x-forwarded-for");
        assert_eq!(
            extractor.extract("203.0.113.7, 10.0.0.1").unwrap(),
            "10.0.0.1"
        );
        assert_eq!(extractor.extract("203.0.113.7").unwrap(), "203.0.113.7");
        assert!(extractor.extract("not-an-ip").is_err());
        assert!(extractor.extract("").is_err());
    }

    #[test]
    fn test_single_ip_headers() {
        let extractor = IpExtractor::from(ClientIpHeader::CfConnectingIp);
        assert_eq!(extractor.header_name, "cf-connecting-ip");
        assert_eq!(extractor.extract(" 2001:db8::1 ").unwrap(), "2001:db8::1");

        let extractor = IpExtractor::from(ClientIpHeader::XRealIp);
        assert!(extractor.extract("198.51.100.1, 10.0.0.1").is_err());
    }

    #[test]
    fn test_ban_args() {
        let args = args(&[
            "--ip-header",
            "x-real-ip",
            "--ban-ip",
            "192.168.1.1,192.168.1.2",
            "--ban-user-agent",
            "Googlebot",
        ]);
        assert_eq!(args.ip_header, Some(ClientIpHeader::XRealIp));
        assert_eq!(args.ban_ip.len(), 2);
        assert_eq!(args.ban_user_agent, vec!["Googlebot".to_string()]);
    }

    #[test]
    fn test_validate_public_url() {
        assert!(validate_public_url("https://contacts.example.com").is_some());
        assert!(validate_public_url("ftp://contacts.example.com").is_none());
        assert!(validate_public_url("not a url").is_none());
    }

    #[tokio::test]
    async fn test_build_config() {
        let db = Database::open(":memory:").await.unwrap();
        let args = args(&[
            "--access-ttl-secs",
            "60",
            "--hash-memory-kib",
            "64",
            "--hash-iterations",
            "1",
            "--hash-parallelism",
            "1",
            "--no-rate-limit",
        ]);
        let url = Url::parse("http://localhost:8000").unwrap();

        let config = build_config(&args, db, url, "x".repeat(32)).unwrap();
        assert_eq!(config.token_ttls.access, 60);
        assert_eq!(config.hasher.cost().memory_kib, 64);
        assert!(config.rate_limit.is_none());
        assert!(config.bans.is_none());
    }

    #[tokio::test]
    async fn test_build_config_rejects_bad_ban_pattern() {
        let db = Database::open(":memory:").await.unwrap();
        let args = args(&["--ban-user-agent", "(unclosed"]);
        let url = Url::parse("http://localhost:8000").unwrap();

        assert!(build_config(&args, db, url, "x".repeat(32)).is_err());
    }

    #[tokio::test]
    async fn test_build_config_rejects_zero_ttl() {
        let db = Database::open(":memory:").await.unwrap();
        let args = args(&["--verify-ttl-secs", "0"]);
        let url = Url::parse("http://localhost:8000").unwrap();

        assert!(build_config(&args, db, url, "x".repeat(32)).is_err());
    }

    #[tokio::test]
    async fn test_promote_admin() {
        use crate::db::NewUser;

        let db = Database::open(":memory:").await.unwrap();
        let id = db
            .users()
            .create(NewUser {
                uuid: "uuid-123",
                username: "alice",
                email: "alice@example.com",
                password_hash: "$argon2id$placeholder",
                avatar: None,
            })
            .await
            .unwrap();

        assert!(handle_promote_admin(&db, "alice@example.com").await.is_err());
        assert!(handle_promote_admin(&db, "bob@example.com").await.is_err());

        db.users().set_verified("alice@example.com").await.unwrap();
        handle_promote_admin(&db, "alice@example.com").await.unwrap();
        assert_eq!(
            db.users().get_by_id(id).await.unwrap().unwrap().role,
            UserRole::Admin
        );
    }
}
