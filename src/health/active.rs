//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every peer's health path
//! - Feed the results into the aggregator

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::sync::broadcast;
use tokio::time;

use crate::config::HealthConfig;
use crate::health::aggregator::HealthAggregator;
use crate::resilience::peer::{PeerClient, PeerRegistry};

pub struct PeerProber {
    peers: Arc<PeerRegistry>,
    health: Arc<HealthAggregator>,
    config: HealthConfig,
    client: Client<HttpConnector, Body>,
}

impl PeerProber {
    pub fn new(peers: Arc<PeerRegistry>, health: Arc<HealthAggregator>, config: HealthConfig) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Self {
            peers,
            health,
            config,
            client,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.probe_enabled {
            tracing::info!("Active peer probing disabled");
            return;
        }

        tracing::info!(
            interval = self.config.probe_interval_secs,
            path = %self.config.probe_path,
            "Peer prober starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.probe_interval_secs));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Peer prober received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    pub async fn check_all(&self) {
        for peer in self.peers.iter() {
            let healthy = self.probe(peer).await;
            self.health.update_dependency(peer.name(), healthy);
        }
    }

    /// A peer is healthy if any of its instances answers with success.
    async fn probe(&self, peer: &PeerClient) -> bool {
        for base in peer.base_urls() {
            let uri = format!("{}{}", base, self.config.probe_path);
            let request = match Request::builder()
                .method("GET")
                .uri(&uri)
                .header("user-agent", "ems-gateway-probe")
                .body(Body::empty())
            {
                Ok(req) => req,
                Err(e) => {
                    tracing::error!(uri = %uri, error = %e, "Failed to build probe request");
                    continue;
                }
            };

            let timeout = Duration::from_secs(self.config.probe_timeout_secs);
            match time::timeout(timeout, self.client.request(request)).await {
                Ok(Ok(response)) if response.status().is_success() => return true,
                Ok(Ok(response)) => {
                    tracing::debug!(peer = peer.name(), uri = %uri, status = %response.status(), "Probe failed: non-success status");
                }
                Ok(Err(e)) => {
                    tracing::debug!(peer = peer.name(), uri = %uri, error = %e, "Probe failed: connection error");
                }
                Err(_) => {
                    tracing::debug!(peer = peer.name(), uri = %uri, "Probe failed: timeout");
                }
            }
        }
        false
    }
}
