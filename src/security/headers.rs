//! Header manipulation for forwarded requests.
//!
//! # Responsibilities
//! - Resolve the originating client address behind proxies
//! - Strip hop-by-hop headers
//! - Append the caller to X-Forwarded-For
//!
//! # Design Decisions
//! - Proxy headers are consulted in a fixed order; the socket address is the
//!   last resort
//! - Values that are empty or the literal `unknown` are skipped

use std::net::SocketAddr;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Proxy headers tried, in order, after X-Forwarded-For.
const CLIENT_IP_HEADERS: [&str; 3] = ["x-real-ip", "proxy-client-ip", "wl-proxy-client-ip"];

/// Literal returned when no address can be resolved.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Hop-by-hop headers (RFC 7230 §6.1) never forwarded to a peer.
const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

fn usable(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty() && !value.eq_ignore_ascii_case(UNKNOWN_CLIENT)).then_some(value)
}

/// Resolve the client address for logging.
pub fn resolve_client_addr(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(usable);

    forwarded
        .or_else(|| {
            CLIENT_IP_HEADERS.iter().find_map(|name| {
                headers
                    .get(*name)
                    .and_then(|v| v.to_str().ok())
                    .and_then(usable)
            })
        })
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Remove hop-by-hop headers, including any named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

/// Append the immediate peer to X-Forwarded-For.
pub fn append_forwarded_for(headers: &mut HeaderMap, peer: Option<SocketAddr>) {
    let Some(peer) = peer else { return };
    let ip = peer.ip().to_string();

    let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) if !existing.trim().is_empty() => format!("{existing}, {ip}"),
        _ => ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}
