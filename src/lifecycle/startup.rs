//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order
//! - Start background tasks (health report, peer probes)
//! - Bind the listener and serve until a signal arrives
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listener binds last (traffic only when ready)

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::config::GatewayConfig;
use crate::health::active::PeerProber;
use crate::health::reporter::run_reporter;
use crate::http::server::{HttpServer, StartupError};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::wait_for_shutdown;
use crate::observability::metrics;

/// Run the gateway until SIGINT/SIGTERM.
pub async fn run(config: GatewayConfig) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = HttpServer::new(&config)?;
    let shutdown = Shutdown::new();

    let reporter = tokio::spawn(run_reporter(
        server.health().clone(),
        Duration::from_secs(config.health.report_interval_secs),
        shutdown.subscribe(),
    ));
    let prober = PeerProber::new(
        server.peers().clone(),
        server.health().clone(),
        config.health.clone(),
    );
    let prober = tokio::spawn(prober.run(shutdown.subscribe()));

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let mut serving = tokio::spawn(server.run(listener, shutdown.subscribe()));

    let served = tokio::select! {
        _ = wait_for_shutdown() => {
            shutdown.trigger();
            serving.await
        }
        result = &mut serving => {
            shutdown.trigger();
            result
        }
    };
    match served {
        Ok(result) => result?,
        Err(e) => tracing::error!(error = %e, "Server task failed"),
    }
    let _ = tokio::join!(reporter, prober);

    tracing::info!("Shutdown complete");
    Ok(())
}
