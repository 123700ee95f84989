//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to peer:
//!     → client.rs (deadline per attempt, classify failure)
//!     → On UNAVAILABLE: retries.rs (attempt budget, backoff.rs delay)
//!     → outcome.rs (Success | NOT_FOUND | UNAVAILABLE)
//!     → health flag updated, edge-triggered
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - NOT_FOUND is a business answer, never retried, never unhealthy
//! - Transport faults stop here and surface as a typed unavailable error

pub mod backoff;
pub mod client;
pub mod outcome;
pub mod peer;
pub mod retries;

pub use client::{ClassifyFailure, ResilientClient};
pub use outcome::{FailureKind, ServiceCallOutcome};
pub use peer::{PeerClient, PeerError, PeerRegistry};
pub use retries::{CallSettings, RetryPolicy};
