//! ems-gateway
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────────┐
//!                       │                    GATEWAY                        │
//!   Client Request      │  ┌─────────────┐  ┌───────────┐  ┌────────────┐  │
//!   ────────────────────┼─▶│ correlation │─▶│access log │─▶│  access    │  │
//!                       │  │   context   │  │ + limits  │  │  control   │  │
//!                       │  └─────────────┘  └───────────┘  └─────┬──────┘  │
//!                       │                                        ▼         │
//!                       │           ┌──────────────┐     ┌─────────────┐   │
//!                       │           │  composite   │◀───▶│  routing /  │   │
//!                       │           │  handlers    │     │  forwarding │   │
//!                       │           └──────┬───────┘     └──────┬──────┘   │
//!                       │                  ▼                    ▼          │
//!                       │           ┌─────────────────────────────────┐    │      employee-service
//!                       │           │ resilience (deadline, retries)  │────┼────▶ department-service
//!                       │           └─────────────────────────────────┘    │
//!                       │  health aggregator · reporter · prober · metrics │
//!                       └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use ems_gateway::config::validation::validate_config;
use ems_gateway::config::{load_config, GatewayConfig};
use ems_gateway::lifecycle::startup;
use ems_gateway::observability::logging::init_logging;

#[derive(Parser, Debug)]
#[command(name = "ems-gateway", version, about = "Employee management edge gateway")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "EMS_GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{e}");
                return ExitCode::FAILURE;
            }
        },
        None => {
            let config = GatewayConfig::default();
            if let Err(errors) = validate_config(&config) {
                for error in errors {
                    eprintln!("{error}");
                }
                return ExitCode::FAILURE;
            }
            config
        }
    };

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ems-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        peers = config.peers.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if args.check {
        println!("configuration OK");
        return ExitCode::SUCCESS;
    }

    match startup::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Gateway failed");
            ExitCode::FAILURE
        }
    }
}
