//! Request blocking by client IP and User-Agent.

use std::net::IpAddr;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use regex::RegexSet;
use serde::Serialize;

use crate::auth::extract_client_ip;
use crate::cli::IpExtractor;

/// Banned client IPs and User-Agent patterns.
pub struct BanList {
    ips: Vec<IpAddr>,
    user_agents: RegexSet,
    ip_extractor: Option<IpExtractor>,
}

impl BanList {
    /// Patterns are regular expressions searched anywhere in the User-Agent.
    pub fn new<S: AsRef<str>>(
        ips: Vec<IpAddr>,
        user_agent_patterns: &[S],
        ip_extractor: Option<IpExtractor>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            ips,
            user_agents: RegexSet::new(user_agent_patterns)?,
            ip_extractor,
        })
    }

    pub fn is_banned_ip(&self, ip: &IpAddr) -> bool {
        self.ips.contains(ip)
    }

    pub fn is_banned_user_agent(&self, user_agent: &str) -> bool {
        self.user_agents.is_match(user_agent)
    }

    fn is_banned(&self, request: &Request) -> bool {
        // An IP we cannot determine cannot be on the list
        let ip_banned = extract_client_ip(request, self.ip_extractor.as_ref())
            .ok()
            .and_then(|ip| ip.parse::<IpAddr>().ok())
            .is_some_and(|ip| self.is_banned_ip(&ip));

        let agent_banned = request
            .headers()
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|agent| self.is_banned_user_agent(agent));

        ip_banned || agent_banned
    }
}

#[derive(Serialize)]
struct BannedResponse {
    detail: &'static str,
}

/// Middleware rejecting banned clients with 403.
pub async fn reject_banned(
    State(bans): State<Arc<BanList>>,
    request: Request,
    next: Next,
) -> Response {
    if bans.is_banned(&request) {
        tracing::warn!("Rejected banned client");
        return (
            StatusCode::FORBIDDEN,
            Json(BannedResponse {
                detail: "You are banned",
            }),
        )
            .into_response();
    }
    next.run(request).await
}
