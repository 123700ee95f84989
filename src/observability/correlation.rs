//! Per-request correlation identity.
//!
//! # Responsibilities
//! - Inherit `X-Correlation-Id` from the caller or generate a fresh one
//! - Echo it on the response and expose it to inner layers and handlers
//! - Keep it bound for exactly the lifetime of the request
//!
//! # Design Decisions
//! - The ambient binding is a tokio task-local, set around every poll of the
//!   request future, so it follows the request across suspension points and
//!   never sticks to a worker thread
//! - A `request{correlation_id}` span is entered on every poll, which puts
//!   the id on every log line emitted while handling the request
//! - Work moved to another task or the blocking pool must be wrapped with
//!   [`in_current_scope`] or [`spawn_blocking_in_scope`]; nothing leaks
//!   implicitly

use std::convert::Infallible;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use tracing::Instrument;
use uuid::Uuid;

use crate::auth::principal::ANONYMOUS;

/// Header carrying the correlation id in both directions.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Longest inbound id accepted as-is.
pub const MAX_CORRELATION_ID_LEN: usize = 128;

tokio::task_local! {
    static CURRENT: CorrelationContext;
}

/// Correlation identity of one inbound request.
///
/// Cheap to clone; clones share the principal slot.
#[derive(Debug, Clone)]
pub struct CorrelationContext {
    id: Arc<str>,
    started_at: Instant,
    received_at: DateTime<Utc>,
    principal: Arc<OnceLock<String>>,
}

impl CorrelationContext {
    /// New context with a freshly generated id.
    pub fn generate() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    /// New context with a caller-supplied id.
    pub fn with_id(id: impl Into<Arc<str>>) -> Self {
        Self {
            id: id.into(),
            started_at: Instant::now(),
            received_at: Utc::now(),
            principal: Arc::new(OnceLock::new()),
        }
    }

    /// Inherit the inbound header when usable, otherwise generate.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        match inbound_id(headers) {
            Some(id) => Self::with_id(id),
            None => Self::generate(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Principal display name, `anonymous` until one is bound.
    pub fn principal_name(&self) -> &str {
        self.principal.get().map(String::as_str).unwrap_or(ANONYMOUS)
    }

    /// Bind the principal name. Only the first call has an effect.
    pub fn bind_principal(&self, name: &str) {
        let _ = self.principal.set(name.to_string());
    }

    /// Header value for outbound calls and the response.
    pub fn header_value(&self) -> Option<HeaderValue> {
        HeaderValue::from_str(&self.id).ok()
    }

    /// The context bound to the running request, if any.
    pub fn current() -> Option<Self> {
        CURRENT.try_with(Clone::clone).ok()
    }

    /// Run `fut` with this context bound on every poll.
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        let span = tracing::info_span!("request", correlation_id = %self.id);
        CURRENT.scope(self, fut.instrument(span)).await
    }

    /// Run `f` on the current thread with this context bound.
    pub fn sync_scope<R>(self, f: impl FnOnce() -> R) -> R {
        let span = tracing::info_span!("request", correlation_id = %self.id);
        CURRENT.sync_scope(self, || span.in_scope(f))
    }
}

fn inbound_id(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CORRELATION_ID_HEADER)?.to_str().ok()?.trim();
    if value.is_empty() || value.len() > MAX_CORRELATION_ID_LEN {
        return None;
    }
    Some(value.to_string())
}

/// Carry the caller's binding into a future that will run elsewhere
/// (typically `tokio::spawn`). The binding is captured now, not at first poll.
pub fn in_current_scope<F: Future>(fut: F) -> impl Future<Output = F::Output> {
    let ctx = CorrelationContext::current();
    async move {
        match ctx {
            Some(ctx) => ctx.scope(fut).await,
            None => fut.await,
        }
    }
}

/// `spawn_blocking` with the caller's binding restored on the blocking thread
/// and removed again before the thread is returned to the pool.
pub fn spawn_blocking_in_scope<F, R>(f: F) -> tokio::task::JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let ctx = CorrelationContext::current();
    tokio::task::spawn_blocking(move || match ctx {
        Some(ctx) => ctx.sync_scope(f),
        None => f(),
    })
}

/// Outermost middleware: establishes the context for the whole pipeline.
pub async fn correlation_middleware(mut req: Request<Body>, next: Next) -> Response {
    let ctx = CorrelationContext::from_headers(req.headers());
    let header = ctx.header_value();

    if let Some(value) = &header {
        req.headers_mut().insert(CORRELATION_ID_HEADER, value.clone());
    }
    req.extensions_mut().insert(ctx.clone());

    let mut response = ctx.scope(next.run(req)).await;

    if let Some(value) = header {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}

impl<S: Send + Sync> FromRequestParts<S> for CorrelationContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Self>()
            .cloned()
            .or_else(Self::current)
            .unwrap_or_else(|| Self::from_headers(&parts.headers)))
    }
}
