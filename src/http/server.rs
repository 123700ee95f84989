//! HTTP server setup.
//!
//! # Responsibilities
//! - Build every subsystem the request path needs from the config
//! - Create the Axum router with gateway-owned handlers and the forward fallback
//! - Wire up the middleware pipeline
//! - Serve until the shutdown signal fires
//!
//! # Pipeline (outermost first)
//! ```text
//! correlation → cors → access_log → body limit → timeout → catch panic
//!     → access control → handler / forward
//! ```

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    error_handling::HandleErrorLayer,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    BoxError, Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::{timeout::error::Elapsed, timeout::TimeoutLayer, ServiceBuilder};
use tower_http::catch_panic::CatchPanicLayer;

use crate::auth::token::{Authenticator, JwtVerifier, TokenError};
use crate::config::GatewayConfig;
use crate::health::aggregator::HealthAggregator;
use crate::http::error::ApiError;
use crate::http::forward::{forward_handler, Forwarder};
use crate::http::handlers;
use crate::observability::access_log::{access_log_middleware, AccessLogState};
use crate::observability::correlation::correlation_middleware;
use crate::resilience::client::ResilientClient;
use crate::resilience::peer::PeerRegistry;
use crate::routing::ProxyRouter;
use crate::security::access_control::{access_control_middleware, AccessControlState};
use crate::security::cors::cors_layer;
use crate::security::limits::{body_limit_middleware, BodyLimit};
use crate::security::policy::RoutePolicy;

/// Reasons the gateway could not be brought up.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("token verifier: {0}")]
    Token(#[from] TokenError),

    #[error("peer client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub health: Arc<HealthAggregator>,
    pub peers: Arc<PeerRegistry>,
    pub forwarder: Arc<Forwarder>,
}

/// The assembled gateway: router plus the shared pieces background tasks need.
pub struct HttpServer {
    router: Router,
    health: Arc<HealthAggregator>,
    peers: Arc<PeerRegistry>,
}

impl HttpServer {
    /// Build every subsystem from a validated config.
    pub fn new(config: &GatewayConfig) -> Result<Self, StartupError> {
        let verifier = JwtVerifier::from_config(&config.auth)?;
        let authenticator = Authenticator::new(Box::new(verifier), config.auth.claims.clone());
        let access = AccessControlState {
            authenticator: Arc::new(authenticator),
            policy: Arc::new(RoutePolicy::from_config(&config.policy)),
        };
        Self::with_access_control(config, access)
    }

    /// Like [`HttpServer::new`] with a caller-supplied authenticator and policy.
    pub fn with_access_control(
        config: &GatewayConfig,
        access: AccessControlState,
    ) -> Result<Self, StartupError> {
        let health = Arc::new(HealthAggregator::new());
        let peers = Arc::new(PeerRegistry::from_config(config, health.clone())?);

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        let forwarder = Forwarder::new(
            Arc::new(ProxyRouter::from_config(&config.routes)),
            peers.clone(),
            client,
            ResilientClient::new(health.clone()),
            config.security.max_body_size,
        );

        let state = AppState {
            health: health.clone(),
            peers: peers.clone(),
            forwarder: Arc::new(forwarder),
        };

        tracing::info!(
            routes = config.routes.len(),
            peers = config.peers.len(),
            policy_rules = access.policy.len(),
            "Gateway assembled"
        );

        let router = build_router(state, access, config);
        Ok(Self {
            router,
            health,
            peers,
        })
    }

    /// The fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn health(&self) -> &Arc<HealthAggregator> {
        &self.health
    }

    pub fn peers(&self) -> &Arc<PeerRegistry> {
        &self.peers
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Routes plus the full middleware pipeline.
pub fn build_router(state: AppState, access: AccessControlState, config: &GatewayConfig) -> Router {
    let access_log = AccessLogState {
        health: state.health.clone(),
        slow_request: Duration::from_millis(config.observability.slow_request_ms),
    };

    let routes = Router::new()
        .route("/actuator/health", get(handlers::health))
        .route("/api/employees/{id}", get(handlers::employee_with_department))
        .fallback(forward_handler)
        .with_state(state);

    apply_pipeline(routes, access, access_log, config)
}

/// Wrap `routes` in the request pipeline. Layers added last run first.
pub fn apply_pipeline(
    routes: Router,
    access: AccessControlState,
    access_log: AccessLogState,
    config: &GatewayConfig,
) -> Router {
    let request_timeout = Duration::from_secs(config.timeouts.request_secs);
    routes
        .layer(middleware::from_fn_with_state(access, access_control_middleware))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(move |error: BoxError| async move {
                    timeout_response(error, request_timeout)
                }))
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .layer(middleware::from_fn_with_state(
            BodyLimit(config.security.max_body_size),
            body_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(access_log, access_log_middleware))
        .layer(cors_layer(&config.security))
        .layer(middleware::from_fn(correlation_middleware))
}

fn timeout_response(error: BoxError, limit: Duration) -> ApiError {
    if error.is::<Elapsed>() {
        ApiError::Timeout(limit)
    } else {
        ApiError::Internal(error.to_string())
    }
}

fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = %detail, "Handler panicked");
    ApiError::Internal("unexpected error".to_string()).into_response()
}
