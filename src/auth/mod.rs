//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! Authorization: Bearer <jwt>
//!     → token.rs (signature, expiry, issuer/audience)
//!     → claims.rs (roles from realm/client role claims, ROLE_ prefix)
//!     → principal.rs (subject, display name, role set)
//! ```
//!
//! # Design Decisions
//! - Verification failures never reject a request here; the route policy
//!   decides whether an anonymous caller is acceptable
//! - Verification sits behind [`TokenVerifier`] so other key sources can be
//!   plugged in

pub mod claims;
pub mod principal;
pub mod token;

pub use claims::{extract_roles, RoleClaimsConfig};
pub use principal::Principal;
pub use token::{Authenticator, JwtVerifier, TokenError, TokenVerifier};
