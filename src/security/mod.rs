//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → cors.rs (preflight and response headers)
//!     → limits.rs (request body size)
//!     → access_control.rs (bearer token → principal → policy decision)
//!     → headers.rs (client address, hop-by-hop stripping, X-Forwarded-For)
//!     → Pass to handlers / forwarding
//! ```
//!
//! # Design Decisions
//! - Fail closed: unmatched routes require an authenticated principal
//! - A bad token never errors on its own; the policy decides
//! - Policy is compiled once and shared read-only

pub mod access_control;
pub mod cors;
pub mod headers;
pub mod limits;
pub mod policy;

pub use access_control::{access_control_middleware, AccessControlState, RequestIdentity};
pub use limits::{body_limit_middleware, BodyLimit};
pub use policy::{Decision, DenyReason, RoutePolicy};
