//! Periodic health report.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::health::aggregator::{HealthAggregator, HealthSnapshot, OverallStatus};

/// Log one report: a summary line plus one line per dependency.
pub fn log_report(snapshot: &HealthSnapshot) {
    let status = match snapshot.status {
        OverallStatus::Up => "UP",
        OverallStatus::Down => "DOWN",
    };
    tracing::info!(
        target: "health",
        status,
        uptime_seconds = snapshot.uptime_seconds,
        requests = snapshot.request_count,
        errors = snapshot.error_count,
        error_rate_percent = snapshot.error_rate_percent,
        "health report"
    );
    for (name, dependency) in &snapshot.dependencies {
        tracing::info!(
            target: "health",
            dependency = %name,
            healthy = dependency.healthy,
            last_check = %dependency.last_check,
            "dependency status"
        );
    }
}

/// Log a report every `interval` until shutdown.
pub async fn run_reporter(
    health: Arc<HealthAggregator>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = time::interval(interval);
    // The first tick fires immediately; skip it so reports start after one interval.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => log_report(&health.snapshot()),
            _ = shutdown.recv() => {
                tracing::debug!("Health reporter stopping");
                break;
            }
        }
    }
}
