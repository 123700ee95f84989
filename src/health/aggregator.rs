//! Process-wide request counters and dependency health.
//!
//! # Responsibilities
//! - Count requests and errors since start (lock-free)
//! - Track last-known health of each downstream dependency
//! - Produce point-in-time snapshots for the probe and the reporter
//!
//! # State Transitions
//! ```text
//! Healthy → Unhealthy: one failed call or probe (logged once)
//! Unhealthy → Healthy: one successful call or probe (logged once)
//! ```
//!
//! # Design Decisions
//! - Counters are independent `AtomicU64`s; a snapshot may be a few events
//!   apart between the two, never lose one
//! - The dependency map is sharded (dashmap), entries held only briefly
//! - Unknown dependencies are assumed healthy until proven otherwise

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::observability::metrics;

/// Last-known state of one dependency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DependencyStatus {
    pub healthy: bool,
    pub last_check: DateTime<Utc>,
}

/// A change of a dependency's health flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTransition {
    WentDown,
    Recovered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OverallStatus {
    Up,
    Down,
}

/// Point-in-time view of the aggregator.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: OverallStatus,
    pub uptime_seconds: i64,
    pub request_count: u64,
    pub error_count: u64,
    pub error_rate_percent: f64,
    pub dependencies: BTreeMap<String, DependencyStatus>,
    pub unhealthy: Vec<String>,
}

#[derive(Debug)]
pub struct HealthAggregator {
    started_at: Instant,
    requests: AtomicU64,
    errors: AtomicU64,
    dependencies: DashMap<String, DependencyStatus>,
}

impl HealthAggregator {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            dependencies: DashMap::new(),
        }
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Start tracking a dependency as healthy. No-op if already known.
    pub fn register_dependency(&self, name: &str) {
        self.dependencies
            .entry(name.to_string())
            .or_insert_with(|| DependencyStatus {
                healthy: true,
                last_check: Utc::now(),
            });
    }

    /// Record the outcome of a call or probe against `name`.
    ///
    /// Returns the transition, if any. Same-state updates only refresh
    /// `last_check` and log nothing.
    pub fn update_dependency(&self, name: &str, healthy: bool) -> Option<HealthTransition> {
        let now = Utc::now();
        let previous = {
            let mut entry = self
                .dependencies
                .entry(name.to_string())
                .or_insert(DependencyStatus {
                    healthy: true,
                    last_check: now,
                });
            let previous = entry.healthy;
            *entry = DependencyStatus {
                healthy,
                last_check: now,
            };
            previous
        };

        let transition = match (previous, healthy) {
            (true, false) => HealthTransition::WentDown,
            (false, true) => HealthTransition::Recovered,
            _ => return None,
        };

        metrics::record_dependency_health(name, healthy);
        match transition {
            HealthTransition::WentDown => {
                tracing::error!(target: "health", dependency = %name, "dependency DOWN");
            }
            HealthTransition::Recovered => {
                tracing::info!(target: "health", dependency = %name, "dependency recovered");
            }
        }
        Some(transition)
    }

    pub fn is_dependency_healthy(&self, name: &str) -> Option<bool> {
        self.dependencies.get(name).map(|s| s.healthy)
    }

    /// Healthy iff every known dependency is healthy.
    pub fn is_healthy(&self) -> bool {
        self.dependencies.iter().all(|entry| entry.healthy)
    }

    pub fn uptime_seconds(&self) -> i64 {
        i64::try_from(self.started_at.elapsed().as_secs()).unwrap_or(i64::MAX)
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let request_count = self.requests.load(Ordering::Relaxed);
        let error_count = self.errors.load(Ordering::Relaxed);

        let dependencies: BTreeMap<String, DependencyStatus> = self
            .dependencies
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        let unhealthy: Vec<String> = dependencies
            .iter()
            .filter(|(_, status)| !status.healthy)
            .map(|(name, _)| name.clone())
            .collect();

        HealthSnapshot {
            status: if unhealthy.is_empty() {
                OverallStatus::Up
            } else {
                OverallStatus::Down
            },
            uptime_seconds: self.uptime_seconds(),
            request_count,
            error_count,
            error_rate_percent: error_rate(request_count, error_count),
            dependencies,
            unhealthy,
        }
    }
}

impl Default for HealthAggregator {
    fn default() -> Self {
        Self::new()
    }
}

fn error_rate(requests: u64, errors: u64) -> f64 {
    if requests == 0 {
        0.0
    } else {
        errors as f64 * 100.0 / requests as f64
    }
}
