//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Every request:
//!     → correlation.rs (id inherited or generated, bound for the request)
//!     → access_log.rs (one record per request, counters, metrics)
//!
//! All subsystems produce:
//!     → logging.rs (structured log events, correlation span attached)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Correlation id flows through all subsystems and to every peer
//! - Metrics are cheap (atomic increments)

pub mod access_log;
pub mod correlation;
pub mod logging;
pub mod metrics;

pub use correlation::{CorrelationContext, CORRELATION_ID_HEADER};
