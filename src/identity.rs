//! Caller identification for rate limiting and slow-request summaries.

use axum::extract::{ConnectInfo, Request};
use axum::http::HeaderMap;
use std::fmt;
use std::net::SocketAddr;

/// Inserted into request extensions by the authentication layer once a
/// bearer token has been verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// Who is calling: the authenticated user when known, else the network address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallerIdentity {
    User(String),
    Address(String),
}

impl CallerIdentity {
    pub fn from_request(request: &Request) -> Self {
        if let Some(user) = request.extensions().get::<AuthenticatedUser>() {
            return CallerIdentity::User(user.0.clone());
        }

        CallerIdentity::Address(client_ip(request))
    }

    /// Key used by the rate limiter's identifier map.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallerIdentity::User(id) => write!(f, "user:{}", id),
            CallerIdentity::Address(ip) => write!(f, "ip:{}", ip),
        }
    }
}

/// Category of client that sent the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientClass {
    Mobile,
    Other,
}

impl ClientClass {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_ascii_lowercase())
        };

        if header("x-client-type").as_deref() == Some("mobile") {
            return ClientClass::Mobile;
        }

        match header("x-app-platform").as_deref() {
            Some("ios") | Some("android") => ClientClass::Mobile,
            _ => ClientClass::Other,
        }
    }

    pub fn is_mobile(self) -> bool {
        self == ClientClass::Mobile
    }
}

/// Best-effort client address: proxy headers first, then the socket peer.
pub fn client_ip(request: &Request) -> String {
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(first_ip) = forwarded_str.split(',').next() {
                let first_ip = first_ip.trim();
                if !first_ip.is_empty() {
                    return first_ip.to_string();
                }
            }
        }
    }

    if let Some(real_ip) = request.headers().get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return ip_str.trim().to_string();
        }
    }

    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        addr.ip().to_string()
    } else if let Some(addr) = request.extensions().get::<SocketAddr>() {
        addr.ip().to_string()
    } else {
        "unknown".to_string()
    }
}

/// Short human-readable description of the caller for slow-request records.
pub fn caller_summary(request: &Request) -> String {
    let identity = CallerIdentity::from_request(request);
    let agent = request
        .headers()
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");

    format!("{} ({})", identity, agent)
}
