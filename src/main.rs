use clap::Parser;
use rolodex::cli::{
    Args, build_config, handle_promote_admin, init_logging, load_jwt_secret, open_database,
    validate_public_url,
};
use rolodex::run_server;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(jwt_secret) = load_jwt_secret(args.jwt_secret_file.as_deref()) else {
        std::process::exit(1);
    };

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    if let Some(email) = args.promote_admin.as_deref() {
        if let Err(e) = handle_promote_admin(&db, email).await {
            error!(error = %e, "Failed to promote admin");
            std::process::exit(1);
        }
    }

    let Some(public_url) = validate_public_url(&args.public_url) else {
        std::process::exit(1);
    };

    let config = match build_config(&args, db, public_url, jwt_secret) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    if let Some(header) = args.ip_header {
        info!(header = ?header, "Reading client IPs from proxy header");
    }

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let local_addr = listener.local_addr().unwrap_or_else(|e| {
        error!(error = %e, "Failed to get local address");
        std::process::exit(1);
    });

    info!(address = %local_addr, "Listening");

    if let Err(e) = run_server(config, listener).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
