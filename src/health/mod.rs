//! Health subsystem.
//!
//! # Data Flow
//! ```text
//! Passive (every peer call, resilience::client):
//!     → aggregator.rs update_dependency
//!
//! Active (active.rs, optional):
//!     Periodic timer → probe each peer → aggregator.rs
//!
//! Consumers:
//!     → /actuator/health (snapshot, 200 UP / 503 DOWN)
//!     → reporter.rs (periodic log)
//! ```
//!
//! # Design Decisions
//! - One aggregator per process, shared through `Arc`
//! - Transitions are edge-triggered: logged once per change
//! - Health is per peer, not per instance

pub mod active;
pub mod aggregator;
pub mod reporter;

pub use aggregator::{HealthAggregator, HealthSnapshot, HealthTransition, OverallStatus};
