//! Retry and deadline settings for downstream calls.
//!
//! # Design Decisions
//! - Only UNAVAILABLE outcomes are retried; NOT_FOUND is an answer
//! - Calls whose input cannot be replayed (streamed bodies) get one attempt
//! - Every attempt has its own deadline

use std::time::Duration;

use crate::config::{DownstreamConfig, PeerConfig};
use crate::resilience::backoff::calculate_backoff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Whether another attempt may follow attempt number `attempt`.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.base_delay, self.max_delay)
    }
}

/// Deadline and retry policy for calls to one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSettings {
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl CallSettings {
    /// Settings for a peer: its overrides, else the downstream defaults.
    pub fn for_peer(peer: &PeerConfig, defaults: &DownstreamConfig) -> Self {
        Self {
            timeout: Duration::from_millis(peer.timeout_ms.unwrap_or(defaults.timeout_ms)),
            retry: RetryPolicy {
                max_attempts: peer.max_attempts.unwrap_or(defaults.max_attempts).max(1),
                base_delay: Duration::from_millis(defaults.base_delay_ms),
                max_delay: Duration::from_millis(defaults.max_delay_ms),
            },
        }
    }

    /// Same deadline, no retries.
    pub fn single_attempt(self) -> Self {
        Self {
            retry: RetryPolicy::none(),
            ..self
        }
    }
}
