//! Typed JSON calls to named peer services.
//!
//! # Responsibilities
//! - Keep one HTTP client per peer with round-robin over its base URLs
//! - Attach the correlation id and relay the caller's bearer token
//! - Map peer answers onto NOT_FOUND / UNAVAILABLE / REJECTED, the same way
//!   the forwarding path treats them

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::GatewayConfig;
use crate::health::aggregator::HealthAggregator;
use crate::observability::correlation::{CorrelationContext, CORRELATION_ID_HEADER};
use crate::resilience::client::{ClassifyFailure, ResilientClient};
use crate::resilience::outcome::{FailureKind, ServiceCallOutcome};
use crate::resilience::retries::CallSettings;

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("resource not found")]
    NotFound,

    #[error("peer answered {0}")]
    Status(StatusCode),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid response body: {0}")]
    Decode(#[source] reqwest::Error),
}

impl ClassifyFailure for PeerError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            Self::NotFound => FailureKind::NotFound,
            Self::Status(status) if status.is_client_error() => FailureKind::Rejected,
            _ => FailureKind::Unavailable,
        }
    }
}

/// Client for one named peer.
#[derive(Debug)]
pub struct PeerClient {
    name: String,
    base_urls: Vec<String>,
    next: AtomicUsize,
    settings: CallSettings,
    http: reqwest::Client,
    resilient: ResilientClient,
}

impl PeerClient {
    pub fn new(
        name: impl Into<String>,
        base_urls: Vec<String>,
        settings: CallSettings,
        http: reqwest::Client,
        resilient: ResilientClient,
    ) -> Self {
        Self {
            name: name.into(),
            base_urls: base_urls
                .into_iter()
                .map(|u| u.trim_end_matches('/').to_string())
                .collect(),
            next: AtomicUsize::new(0),
            settings,
            http,
            resilient,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> CallSettings {
        self.settings
    }

    pub fn base_urls(&self) -> &[String] {
        &self.base_urls
    }

    /// Next base URL in round-robin order.
    pub fn next_base_url(&self) -> Option<&str> {
        if self.base_urls.is_empty() {
            return None;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.base_urls.len();
        Some(&self.base_urls[index])
    }

    /// GET `path` and decode the JSON body as `T`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        ctx: &CorrelationContext,
        bearer: Option<&str>,
    ) -> ServiceCallOutcome<T> {
        self.resilient
            .call(&self.name, path, self.settings, || self.fetch_json(path, ctx, bearer))
            .await
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        path: &str,
        ctx: &CorrelationContext,
        bearer: Option<&str>,
    ) -> Result<T, PeerError> {
        let base = self.next_base_url().unwrap_or_default();
        let mut request = self
            .http
            .get(format!("{base}{path}"))
            .header(CORRELATION_ID_HEADER, ctx.id());
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(PeerError::NotFound),
            status if !status.is_success() => Err(PeerError::Status(status)),
            _ => response.json::<T>().await.map_err(PeerError::Decode),
        }
    }
}

/// All configured peers, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct PeerRegistry {
    peers: HashMap<String, Arc<PeerClient>>,
}

impl PeerRegistry {
    /// Build clients for every configured peer and register each one as a
    /// health dependency.
    pub fn from_config(
        config: &GatewayConfig,
        health: Arc<HealthAggregator>,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()?;
        let resilient = ResilientClient::new(health.clone());

        let peers = config
            .peers
            .iter()
            .map(|peer| {
                health.register_dependency(&peer.name);
                let client = PeerClient::new(
                    peer.name.clone(),
                    peer.urls.clone(),
                    CallSettings::for_peer(peer, &config.downstream),
                    http.clone(),
                    resilient.clone(),
                );
                (peer.name.clone(), Arc::new(client))
            })
            .collect();

        Ok(Self { peers })
    }

    pub fn get(&self, name: &str) -> Option<Arc<PeerClient>> {
        self.peers.get(name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<PeerClient>> {
        self.peers.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PeerConfig;

    fn registry(urls: &[&str]) -> (PeerRegistry, Arc<HealthAggregator>) {
        let mut config = GatewayConfig::default();
        config.peers = vec![PeerConfig {
            urls: urls.iter().map(|u| u.to_string()).collect(),
            ..PeerConfig::new("employee-service", "http://unused")
        }];
        let health = Arc::new(HealthAggregator::new());
        (PeerRegistry::from_config(&config, health.clone()).unwrap(), health)
    }

    #[test]
    fn test_round_robin() {
        let (registry, health) = registry(&["http://a:1/", "http://b:2"]);
        let peer = registry.get("employee-service").unwrap();

        assert_eq!(peer.next_base_url(), Some("http://a:1"));
        assert_eq!(peer.next_base_url(), Some("http://b:2"));
        assert_eq!(peer.next_base_url(), Some("http://a:1"));
        assert_eq!(health.is_dependency_healthy("employee-service"), Some(true));
        assert!(registry.get("nobody").is_none());
    }

    #[test]
    fn test_classification() {
        assert_eq!(PeerError::NotFound.failure_kind(), FailureKind::NotFound);
        assert_eq!(
            PeerError::Status(StatusCode::BAD_GATEWAY).failure_kind(),
            FailureKind::Unavailable
        );
        assert_eq!(
            PeerError::Status(StatusCode::UNAUTHORIZED).failure_kind(),
            FailureKind::Rejected
        );
        assert_eq!(
            PeerError::Status(StatusCode::FORBIDDEN).failure_kind(),
            FailureKind::Rejected
        );
    }

    #[tokio::test]
    async fn test_unreachable_peer_is_unavailable() {
        let (registry, health) = registry(&["http://127.0.0.1:1"]);
        let peer = registry.get("employee-service").unwrap();

        let outcome = peer
            .get_json::<serde_json::Value>("/employees/1", &CorrelationContext::generate(), None)
            .await;

        assert_eq!(outcome.failure_kind(), Some(FailureKind::Unavailable));
        assert_eq!(health.is_dependency_healthy("employee-service"), Some(false));
    }
}
