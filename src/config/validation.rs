//! Configuration validation.
//!
//! Semantic checks run after serde has handled syntax. All problems are
//! collected so an operator sees every mistake in one pass.

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::Method;
use thiserror::Error;
use url::Url;

use crate::config::schema::{AccessKind, GatewayConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid {field} address: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("auth: one of hmac_secret or rsa_public_key_path must be set")]
    MissingKeyMaterial,

    #[error("auth: hmac_secret and rsa_public_key_path are mutually exclusive")]
    ConflictingKeyMaterial,

    #[error("auth.claims: {0} must not be empty")]
    EmptyClaimKey(&'static str),

    #[error("policy[{index}]: pattern '{pattern}' must start with '/'")]
    InvalidPattern { index: usize, pattern: String },

    #[error("policy[{index}]: access = \"roles\" requires at least one role")]
    EmptyRoleSet { index: usize },

    #[error("policy[{index}]: unknown HTTP method '{method}'")]
    InvalidMethod { index: usize, method: String },

    #[error("peer '{0}' is defined more than once")]
    DuplicatePeer(String),

    #[error("peer '{0}' has no urls")]
    PeerWithoutUrls(String),

    #[error("peer '{peer}': invalid url '{url}'")]
    InvalidPeerUrl { peer: String, url: String },

    #[error("route '{route}' references unknown peer '{peer}'")]
    UnknownPeer { route: String, peer: String },

    #[error("route '{0}': path_prefix must start with '/'")]
    InvalidPrefix(String),

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),
}

/// Validate a parsed configuration, returning every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    let auth = &config.auth;
    match (&auth.hmac_secret, &auth.rsa_public_key_path) {
        (None, None) => errors.push(ValidationError::MissingKeyMaterial),
        (Some(_), Some(_)) => errors.push(ValidationError::ConflictingKeyMaterial),
        _ => {}
    }
    if auth.claims.roles_key.is_empty() {
        errors.push(ValidationError::EmptyClaimKey("roles_key"));
    }
    if auth.claims.client_id.is_empty() {
        errors.push(ValidationError::EmptyClaimKey("client_id"));
    }

    for (index, rule) in config.policy.iter().enumerate() {
        if !rule.pattern.starts_with('/') {
            errors.push(ValidationError::InvalidPattern {
                index,
                pattern: rule.pattern.clone(),
            });
        }
        if rule.access == AccessKind::Roles && rule.roles.iter().all(|r| r.trim().is_empty()) {
            errors.push(ValidationError::EmptyRoleSet { index });
        }
        for method in &rule.methods {
            if Method::from_bytes(method.to_ascii_uppercase().as_bytes()).is_err() {
                errors.push(ValidationError::InvalidMethod {
                    index,
                    method: method.clone(),
                });
            }
        }
    }

    let mut peer_names = HashSet::new();
    for peer in &config.peers {
        if !peer_names.insert(peer.name.as_str()) {
            errors.push(ValidationError::DuplicatePeer(peer.name.clone()));
        }
        if peer.urls.is_empty() {
            errors.push(ValidationError::PeerWithoutUrls(peer.name.clone()));
        }
        for url in &peer.urls {
            let valid = Url::parse(url)
                .map(|u| matches!(u.scheme(), "http" | "https") && u.host().is_some())
                .unwrap_or(false);
            if !valid {
                errors.push(ValidationError::InvalidPeerUrl {
                    peer: peer.name.clone(),
                    url: url.clone(),
                });
            }
        }
        if peer.timeout_ms == Some(0) {
            errors.push(ValidationError::ZeroValue("peers.timeout_ms"));
        }
        if peer.max_attempts == Some(0) {
            errors.push(ValidationError::ZeroValue("peers.max_attempts"));
        }
    }

    for route in &config.routes {
        if !route.path_prefix.starts_with('/') {
            errors.push(ValidationError::InvalidPrefix(route.name.clone()));
        }
        if !peer_names.contains(route.peer.as_str()) {
            errors.push(ValidationError::UnknownPeer {
                route: route.name.clone(),
                peer: route.peer.clone(),
            });
        }
    }

    if config.downstream.timeout_ms == 0 {
        errors.push(ValidationError::ZeroValue("downstream.timeout_ms"));
    }
    if config.downstream.max_attempts == 0 {
        errors.push(ValidationError::ZeroValue("downstream.max_attempts"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroValue("timeouts.request_secs"));
    }
    if config.health.report_interval_secs == 0 {
        errors.push(ValidationError::ZeroValue("health.report_interval_secs"));
    }
    if config.health.probe_enabled && config.health.probe_interval_secs == 0 {
        errors.push(ValidationError::ZeroValue("health.probe_interval_secs"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
