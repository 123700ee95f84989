//! Request forwarding to peers.
//!
//! # Responsibilities
//! - Map the path onto a route and peer
//! - Rewrite the URI and forwarding headers
//! - Stream the peer's response back
//!
//! # Design Decisions
//! - Bodies are streamed, so a forward is never replayed (single attempt)
//! - The peer's own 4xx answers pass through untouched
//! - 5xx, transport errors and timeouts become DEPENDENCY_UNAVAILABLE
//! - A failed upload is the caller's problem: 413 or 400, peer health untouched
//! - The streamed response body has an idle deadline equal to the peer's call
//!   deadline; a peer that goes quiet mid-body is cut off and marked down

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, request::Parts, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
    BoxError,
};
use http_body_util::BodyExt;
use hyper::body::{Body as HttpBody, Bytes, Frame, Incoming, SizeHint};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use thiserror::Error;
use tokio::time::{Instant, Sleep};

use crate::health::aggregator::HealthAggregator;
use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::observability::correlation::CorrelationContext;
use crate::observability::metrics;
use crate::resilience::client::{ClassifyFailure, ResilientClient};
use crate::resilience::outcome::{FailureKind, ServiceCallOutcome};
use crate::resilience::peer::PeerRegistry;
use crate::routing::ProxyRouter;
use crate::security::headers::{append_forwarded_for, strip_hop_by_hop};
use crate::security::limits::exceeded_limit;

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("peer answered {0}")]
    Status(StatusCode),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    #[error("invalid upstream uri: {0}")]
    Uri(#[from] axum::http::Error),

    #[error("request body already consumed")]
    NotReplayable,

    #[error("inbound request body failed: {0}")]
    Inbound(InboundFailure),
}

impl ClassifyFailure for ForwardError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Inbound(_) => FailureKind::Rejected,
            _ => FailureKind::Unavailable,
        }
    }
}

/// Why the caller's upload could not be relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InboundFailure {
    #[error("body exceeds the size limit")]
    TooLarge,

    #[error("body stream interrupted")]
    Interrupted,
}

/// Marks errors raised by the caller's body while it is relayed.
#[derive(Debug, Error)]
#[error("inbound body: {0}")]
struct InboundBodyError(#[source] axum::Error);

/// Find the caller's body failure in a client error, if that is what broke
/// the exchange.
fn inbound_failure(error: &hyper_util::client::legacy::Error) -> Option<InboundFailure> {
    let root: &(dyn std::error::Error + 'static) = error;
    let inbound = std::iter::successors(Some(root), |e| e.source())
        .find(|e| e.is::<InboundBodyError>())?;
    Some(if exceeded_limit(inbound) {
        InboundFailure::TooLarge
    } else {
        InboundFailure::Interrupted
    })
}

pub struct Forwarder {
    router: Arc<ProxyRouter>,
    peers: Arc<PeerRegistry>,
    client: Client<HttpConnector, Body>,
    resilient: ResilientClient,
    body_limit: usize,
}

impl Forwarder {
    pub fn new(
        router: Arc<ProxyRouter>,
        peers: Arc<PeerRegistry>,
        client: Client<HttpConnector, Body>,
        resilient: ResilientClient,
        body_limit: usize,
    ) -> Self {
        Self {
            router,
            peers,
            client,
            resilient,
            body_limit,
        }
    }

    pub async fn forward(&self, request: Request<Body>) -> Result<Response, ApiError> {
        let path = request.uri().path().to_string();
        let Some(route) = self.router.match_path(&path) else {
            return Err(ApiError::ResourceNotFound(format!("no route for {path}")));
        };
        let peer = self
            .peers
            .get(route.peer)
            .ok_or_else(|| ApiError::Internal(format!("route {} has no peer", route.route)))?;

        let client_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let (mut parts, body) = request.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        parts.headers.remove(header::HOST);
        append_forwarded_for(&mut parts.headers, client_addr);

        let path_and_query = match parts.uri.query() {
            Some(query) => format!("{}?{}", route.upstream_path, query),
            None => route.upstream_path.clone(),
        };

        tracing::debug!(
            route = route.route,
            peer = peer.name(),
            upstream_path = %path_and_query,
            "Forwarding request"
        );

        let settings = peer.settings().single_attempt();
        let inbound = OnceLock::new();
        let mut pending = Some((parts, Body::new(body.map_err(InboundBodyError))));
        let outcome = self
            .resilient
            .call(peer.name(), route.route, settings, || {
                let uri = format!(
                    "{}{}",
                    peer.next_base_url().unwrap_or_default(),
                    path_and_query
                );
                self.send(pending.take(), uri, &inbound)
            })
            .await;

        match outcome {
            ServiceCallOutcome::Success(response) => {
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                let body = PeerBody::new(
                    body,
                    settings.timeout,
                    peer.name(),
                    self.resilient.health().clone(),
                );
                Ok(Response::from_parts(parts, Body::new(body)))
            }
            ServiceCallOutcome::Failed(_) => Err(match inbound.get() {
                Some(InboundFailure::TooLarge) => ApiError::PayloadTooLarge {
                    limit: self.body_limit,
                },
                Some(InboundFailure::Interrupted) => {
                    ApiError::validation("request body could not be read")
                }
                None => ApiError::DependencyUnavailable {
                    peer: peer.name().to_string(),
                },
            }),
        }
    }
}

impl Forwarder {
    async fn send(
        &self,
        pending: Option<(Parts, Body)>,
        uri: String,
        inbound: &OnceLock<InboundFailure>,
    ) -> Result<axum::http::Response<Incoming>, ForwardError> {
        let (mut parts, body) = pending.ok_or(ForwardError::NotReplayable)?;
        parts.uri = uri.parse::<Uri>().map_err(axum::http::Error::from)?;

        let response = self
            .client
            .request(Request::from_parts(parts, body))
            .await
            .map_err(|e| match inbound_failure(&e) {
                Some(failure) => {
                    let _ = inbound.set(failure);
                    ForwardError::Inbound(failure)
                }
                None => ForwardError::Upstream(e),
            })?;
        if response.status().is_server_error() {
            return Err(ForwardError::Status(response.status()));
        }
        Ok(response)
    }
}

/// Peer response body with an idle deadline between frames.
struct PeerBody {
    inner: Pin<Box<Incoming>>,
    idle: Pin<Box<Sleep>>,
    idle_timeout: Duration,
    peer: String,
    correlation_id: Option<String>,
    health: Arc<HealthAggregator>,
    stalled: bool,
}

#[derive(Debug, Error)]
#[error("{peer} sent nothing for {timeout:?} while streaming the response body")]
pub struct BodyStalled {
    peer: String,
    timeout: Duration,
}

impl PeerBody {
    fn new(
        inner: Incoming,
        idle_timeout: Duration,
        peer: &str,
        health: Arc<HealthAggregator>,
    ) -> Self {
        Self {
            inner: Box::pin(inner),
            idle: Box::pin(tokio::time::sleep(idle_timeout)),
            idle_timeout,
            peer: peer.to_string(),
            correlation_id: CorrelationContext::current().map(|ctx| ctx.id().to_string()),
            health,
            stalled: false,
        }
    }
}

impl HttpBody for PeerBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, BoxError>>> {
        let this = self.get_mut();
        if this.stalled {
            return Poll::Ready(None);
        }

        if let Poll::Ready(frame) = this.inner.as_mut().poll_frame(cx) {
            this.idle.as_mut().reset(Instant::now() + this.idle_timeout);
            return Poll::Ready(frame.map(|result| result.map_err(Into::into)));
        }
        if this.idle.as_mut().poll(cx).is_pending() {
            return Poll::Pending;
        }

        // Hyper polls the body outside the correlation scope.
        this.stalled = true;
        tracing::warn!(
            peer = %this.peer,
            correlation_id = this.correlation_id.as_deref().unwrap_or("-"),
            idle_ms = this.idle_timeout.as_millis() as u64,
            "Peer stalled while streaming response body"
        );
        this.health.update_dependency(&this.peer, false);
        metrics::record_downstream_call(&this.peer, FailureKind::Unavailable.as_str());

        Poll::Ready(Some(Err(BodyStalled {
            peer: this.peer.clone(),
            timeout: this.idle_timeout,
        }
        .into())))
    }

    fn is_end_stream(&self) -> bool {
        self.stalled || self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Fallback handler: everything not served by the gateway itself.
pub async fn forward_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    match state.forwarder.forward(request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}
