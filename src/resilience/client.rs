//! Generic resilient call wrapper.
//!
//! # Responsibilities
//! - Bound every attempt with a deadline
//! - Classify failures as NOT_FOUND, UNAVAILABLE or REJECTED
//! - Retry UNAVAILABLE attempts with backoff when the call allows it
//! - Feed the peer's health flag and downstream metrics
//!
//! # Design Decisions
//! - One wrapper for every peer and operation; the error type supplies the
//!   classification through [`ClassifyFailure`]
//! - Callers only ever see a [`ServiceCallOutcome`], never a transport error
//! - Dropping the returned future cancels the in-flight attempt

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use crate::health::aggregator::HealthAggregator;
use crate::observability::metrics;
use crate::resilience::outcome::{FailureKind, ServiceCallOutcome};
use crate::resilience::retries::CallSettings;

/// Maps an operation error onto the two failure kinds.
pub trait ClassifyFailure {
    fn failure_kind(&self) -> FailureKind;
}

#[derive(Debug, Clone)]
pub struct ResilientClient {
    health: Arc<HealthAggregator>,
}

impl ResilientClient {
    pub fn new(health: Arc<HealthAggregator>) -> Self {
        Self { health }
    }

    pub fn health(&self) -> &Arc<HealthAggregator> {
        &self.health
    }

    /// Run `op` against `peer` under `settings`.
    ///
    /// `op` is invoked once per attempt and must build a fresh future each
    /// time.
    pub async fn call<T, E, F, Fut>(
        &self,
        peer: &str,
        operation: &str,
        settings: CallSettings,
        mut op: F,
    ) -> ServiceCallOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ClassifyFailure + Display,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let kind = match tokio::time::timeout(settings.timeout, op()).await {
                Ok(Ok(value)) => {
                    self.health.update_dependency(peer, true);
                    metrics::record_downstream_call(peer, "success");
                    return ServiceCallOutcome::Success(value);
                }
                Ok(Err(e)) => {
                    let kind = e.failure_kind();
                    tracing::debug!(
                        peer = %peer,
                        operation = %operation,
                        attempt,
                        error = %e,
                        kind = kind.as_str(),
                        "Downstream call failed"
                    );
                    kind
                }
                Err(_) => {
                    tracing::warn!(
                        peer = %peer,
                        operation = %operation,
                        attempt,
                        timeout_ms = settings.timeout.as_millis() as u64,
                        "Downstream call timed out"
                    );
                    FailureKind::Unavailable
                }
            };

            match kind {
                FailureKind::NotFound => {
                    // The peer answered, so it is reachable.
                    self.health.update_dependency(peer, true);
                    metrics::record_downstream_call(peer, kind.as_str());
                    return ServiceCallOutcome::Failed(kind);
                }
                FailureKind::Rejected => {
                    metrics::record_downstream_call(peer, kind.as_str());
                    return ServiceCallOutcome::Failed(kind);
                }
                FailureKind::Unavailable if settings.retry.should_retry(attempt) => {
                    let delay = settings.retry.delay_after(attempt);
                    tracing::info!(
                        peer = %peer,
                        operation = %operation,
                        attempt,
                        delay = ?delay,
                        "Retrying downstream call"
                    );
                    tokio::time::sleep(delay).await;
                }
                FailureKind::Unavailable => {
                    self.health.update_dependency(peer, false);
                    metrics::record_downstream_call(peer, kind.as_str());
                    return ServiceCallOutcome::Failed(kind);
                }
            }
        }
    }
}
