//! Authenticated identity for one request.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::auth::claims::{extract_roles, normalize_role, RoleClaimsConfig};

/// Display name used when no principal is present.
pub const ANONYMOUS: &str = "anonymous";

/// The authenticated identity and its normalized role set.
///
/// Built once per request from validated claims and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    subject: String,
    roles: BTreeSet<String>,
    claims: Map<String, Value>,
}

impl Principal {
    /// Build a principal from validated token claims.
    pub fn from_claims(claims: Map<String, Value>, config: &RoleClaimsConfig) -> Self {
        let subject = claims
            .get("sub")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let roles = extract_roles(&claims, config);
        Self {
            subject,
            roles,
            claims,
        }
    }

    /// Build a principal directly. Roles are normalized.
    pub fn new<I, R>(subject: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: AsRef<str>,
    {
        Self {
            subject: subject.into(),
            roles: roles
                .into_iter()
                .filter_map(|r| normalize_role(r.as_ref()))
                .collect(),
            claims: Map::new(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// True if the principal holds `role` (prefix optional).
    pub fn has_role(&self, role: &str) -> bool {
        normalize_role(role).is_some_and(|r| self.roles.contains(&r))
    }

    /// Human-readable name: `preferred_username`, then `email`, then the subject.
    pub fn display_name(&self) -> &str {
        ["preferred_username", "email"]
            .iter()
            .filter_map(|key| self.claims.get(*key).and_then(Value::as_str))
            .find(|name| !name.trim().is_empty())
            .or_else(|| Some(self.subject.as_str()).filter(|s| !s.is_empty()))
            .unwrap_or(ANONYMOUS)
    }
}
