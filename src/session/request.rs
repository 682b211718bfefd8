//! Request helpers: client address, browser fingerprint and the session cookie

use axum::http::{header, HeaderMap};
use ipnet::IpNet;
use sha2::{Digest, Sha256};
use std::net::{IpAddr, SocketAddr};

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";

/// Which peers may speak for the client through forwarding headers
#[derive(Debug, Clone, Default)]
pub struct ProxyPolicy {
    /// Honor X-Forwarded-For / X-Real-IP at all
    pub trust_headers: bool,
    /// If non-empty, only peers inside these networks are trusted
    pub trusted_proxies: Vec<IpNet>,
}

impl ProxyPolicy {
    fn trusts(&self, peer: Option<IpAddr>) -> bool {
        if !self.trust_headers {
            return false;
        }
        if self.trusted_proxies.is_empty() {
            return true;
        }
        peer.is_some_and(|ip| self.trusted_proxies.iter().any(|net| net.contains(&ip)))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Best-effort client address: first X-Forwarded-For hop, then X-Real-IP,
/// then the socket peer. Forwarding headers only count from trusted peers.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, policy: &ProxyPolicy) -> String {
    if policy.trusts(peer.map(|p| p.ip())) {
        let forwarded = header_str(headers, X_FORWARDED_FOR)
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(ip) = forwarded.or_else(|| header_str(headers, X_REAL_IP)) {
            return ip.to_string();
        }
    }
    peer.map(|p| p.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Coarse browser family from a User-Agent string
pub fn browser_family(user_agent: &str) -> &'static str {
    let ua = user_agent.to_lowercase();
    // Order matters: Edge and Opera also claim to be Chrome, Chrome claims Safari
    if ua.contains("edg") {
        "Edge"
    } else if ua.contains("opr/") || ua.contains("opera") {
        "Opera"
    } else if ua.contains("chrome") || ua.contains("crios") {
        "Chrome"
    } else if ua.contains("firefox") || ua.contains("fxios") {
        "Firefox"
    } else if ua.contains("safari") {
        "Safari"
    } else if ua.contains("trident") || ua.contains("msie") {
        "Internet Explorer"
    } else {
        "Unknown"
    }
}

/// Family plus a short digest of the full User-Agent
pub fn browser_fingerprint(headers: &HeaderMap) -> String {
    let user_agent = header_str(headers, header::USER_AGENT.as_str()).unwrap_or("");
    let digest = hex::encode(Sha256::digest(user_agent.as_bytes()));
    format!("{}-{}", browser_family(user_agent), &digest[..12])
}

/// Pull the session token out of the Cookie header(s)
pub fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

pub fn session_cookie(cookie_name: &str, token: &str, max_age_secs: i64) -> String {
    format!("{cookie_name}={token}; Path=/; Max-Age={max_age_secs}; HttpOnly; SameSite=Lax")
}

/// Cookie that tells the browser to forget the session
pub fn expired_cookie(cookie_name: &str) -> String {
    format!("{cookie_name}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax")
}
