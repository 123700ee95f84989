//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware pipeline)
//!     → handlers.rs (health, employee + department composite)
//!     → forward.rs (everything else: route → peer, streamed)
//!     → error.rs (uniform error body on every failure path)
//! ```

pub mod error;
pub mod forward;
pub mod handlers;
pub mod server;

pub use error::ApiError;
pub use server::{AppState, HttpServer, StartupError};
