//! Access logging.
//!
//! # Responsibilities
//! - Emit exactly one record per request, on every exit path
//! - Feed request/error counters and request metrics
//!
//! # Design Decisions
//! - The record is owned by a guard: normal completion logs the real status,
//!   a request future dropped mid-flight (client gone) logs 499, an unwind
//!   logs 500
//! - Severity follows the status class and never changes the response
//! - Duration is measured from correlation entry, the outermost layer

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, Request},
    middleware::Next,
    response::Response,
};
use tracing::Level;

use crate::health::aggregator::HealthAggregator;
use crate::observability::correlation::CorrelationContext;
use crate::observability::metrics;
use crate::security::headers::resolve_client_addr;

/// Status logged when the client went away before a response was produced.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

#[derive(Clone)]
pub struct AccessLogState {
    pub health: Arc<HealthAggregator>,
    pub slow_request: Duration,
}

/// One access log record.
#[derive(Debug, Clone)]
pub struct AccessLogEntry {
    pub correlation_id: String,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub duration: Duration,
    pub client_addr: String,
    pub user: String,
    pub user_agent: String,
}

impl AccessLogEntry {
    pub fn duration_ms(&self) -> u64 {
        u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Log level for a response status.
pub fn severity(status: u16) -> Level {
    match status {
        500..=u16::MAX => Level::ERROR,
        400..=499 => Level::WARN,
        _ => Level::INFO,
    }
}

macro_rules! emit {
    ($level:expr, $entry:expr) => {{
        let e = $entry;
        tracing::event!(
            target: "access_log",
            $level,
            correlation_id = %e.correlation_id,
            method = %e.method,
            path = %e.path,
            status = e.status,
            duration_ms = e.duration_ms(),
            client = %e.client_addr,
            user = %e.user,
            user_agent = %e.user_agent,
            "request completed"
        )
    }};
}

fn log_entry(entry: &AccessLogEntry) {
    let level = severity(entry.status);
    if level == Level::ERROR {
        emit!(Level::ERROR, entry);
    } else if level == Level::WARN {
        emit!(Level::WARN, entry);
    } else {
        emit!(Level::INFO, entry);
    }
}

/// Request facts captured on entry, finalized once.
struct PendingEntry {
    method: String,
    path: String,
    client_addr: String,
    user_agent: String,
}

struct AccessLogGuard {
    pending: Option<PendingEntry>,
    ctx: CorrelationContext,
    state: AccessLogState,
}

impl AccessLogGuard {
    fn finish(&mut self, status: u16) {
        let Some(pending) = self.pending.take() else {
            return;
        };

        let entry = AccessLogEntry {
            correlation_id: self.ctx.id().to_string(),
            method: pending.method,
            path: pending.path,
            status,
            duration: self.ctx.elapsed(),
            client_addr: pending.client_addr,
            user: self.ctx.principal_name().to_string(),
            user_agent: pending.user_agent,
        };

        self.state.health.record_request();
        if status >= 500 {
            self.state.health.record_error();
        }
        metrics::record_request(&entry.method, status, entry.duration);

        log_entry(&entry);
        if entry.duration >= self.state.slow_request {
            tracing::warn!(
                target: "access_log",
                correlation_id = %entry.correlation_id,
                path = %entry.path,
                duration_ms = entry.duration_ms(),
                "slow request"
            );
        }
    }
}

impl Drop for AccessLogGuard {
    fn drop(&mut self) {
        if self.pending.is_some() {
            let status = if std::thread::panicking() {
                500
            } else {
                CLIENT_CLOSED_REQUEST
            };
            self.finish(status);
        }
    }
}

pub async fn access_log_middleware(
    State(state): State<AccessLogState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let ctx = req
        .extensions()
        .get::<CorrelationContext>()
        .cloned()
        .or_else(CorrelationContext::current)
        .unwrap_or_else(CorrelationContext::generate);
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let path = match req.uri().query() {
        Some(query) => format!("{}?{}", req.uri().path(), query),
        None => req.uri().path().to_string(),
    };
    let mut guard = AccessLogGuard {
        pending: Some(PendingEntry {
            method: req.method().to_string(),
            path,
            client_addr: resolve_client_addr(req.headers(), peer),
            user_agent: req
                .headers()
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-")
                .to_string(),
        }),
        ctx,
        state,
    };

    let response = next.run(req).await;
    guard.finish(response.status().as_u16());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity() {
        assert_eq!(severity(200), Level::INFO);
        assert_eq!(severity(302), Level::INFO);
        assert_eq!(severity(401), Level::WARN);
        assert_eq!(severity(CLIENT_CLOSED_REQUEST), Level::WARN);
        assert_eq!(severity(503), Level::ERROR);
    }

    fn guard(health: Arc<HealthAggregator>) -> AccessLogGuard {
        AccessLogGuard {
            pending: Some(PendingEntry {
                method: "GET".into(),
                path: "/x".into(),
                client_addr: "127.0.0.1".into(),
                user_agent: "-".into(),
            }),
            ctx: CorrelationContext::generate(),
            state: AccessLogState {
                health,
                slow_request: Duration::from_secs(60),
            },
        }
    }

    #[test]
    fn test_finish_counts_once() {
        let health = Arc::new(HealthAggregator::new());
        let mut g = guard(health.clone());
        g.finish(502);
        g.finish(200);
        drop(g);

        let snapshot = health.snapshot();
        assert_eq!(snapshot.request_count, 1);
        assert_eq!(snapshot.error_count, 1);
    }

    #[test]
    fn test_dropped_guard_still_counts() {
        let health = Arc::new(HealthAggregator::new());
        drop(guard(health.clone()));

        let snapshot = health.snapshot();
        assert_eq!(snapshot.request_count, 1);
        assert_eq!(snapshot.error_count, 0);
    }
}
