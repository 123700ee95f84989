//! Employee management edge gateway.
//!
//! Authenticates bearer tokens, enforces a per-route role policy, forwards
//! traffic to the employee and department services, and serves a composite
//! employee + department endpoint. Every request carries a correlation id from
//! entry to the access log and on to each peer call.

pub mod auth;
pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod security;

pub use config::schema::GatewayConfig;
pub use http::{HttpServer, StartupError};
pub use lifecycle::Shutdown;
