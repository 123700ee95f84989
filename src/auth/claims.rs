//! Role extraction from identity token claims.
//!
//! Two optional sources are merged:
//! ```text
//! claims[realm_claim][roles_key]               realm-wide roles
//! claims[client_claim][client_id][roles_key]   roles scoped to one client
//! ```
//! Every role comes out carrying [`ROLE_PREFIX`] exactly once. Missing or
//! malformed sections contribute nothing; extraction never fails.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Authority prefix carried by every normalized role.
pub const ROLE_PREFIX: &str = "ROLE_";

/// Where roles live inside the token claims.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RoleClaimsConfig {
    /// Claim holding realm-level roles.
    pub realm_claim: String,

    /// Claim holding per-client role sections.
    pub client_claim: String,

    /// Key of the roles list inside each section.
    pub roles_key: String,

    /// Client whose section under `client_claim` is consulted.
    pub client_id: String,
}

impl Default for RoleClaimsConfig {
    fn default() -> Self {
        Self {
            realm_claim: "realm_access".to_string(),
            client_claim: "resource_access".to_string(),
            roles_key: "roles".to_string(),
            client_id: "ems-api".to_string(),
        }
    }
}

/// Normalize a single role: trim, then add [`ROLE_PREFIX`] unless present.
///
/// Returns `None` for blank input. Applying it to its own output is a no-op.
pub fn normalize_role(role: &str) -> Option<String> {
    let role = role.trim();
    if role.is_empty() || role == ROLE_PREFIX {
        return None;
    }
    if role.starts_with(ROLE_PREFIX) {
        Some(role.to_string())
    } else {
        Some(format!("{ROLE_PREFIX}{role}"))
    }
}

/// Extract the normalized role set from a claims map.
pub fn extract_roles(claims: &Map<String, Value>, config: &RoleClaimsConfig) -> BTreeSet<String> {
    let realm = claims
        .get(&config.realm_claim)
        .and_then(|section| section.get(&config.roles_key));

    let client = claims
        .get(&config.client_claim)
        .and_then(|section| section.get(&config.client_id))
        .and_then(|section| section.get(&config.roles_key));

    [realm, client]
        .into_iter()
        .flatten()
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(Value::as_str)
        .filter_map(normalize_role)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn claims(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn set(roles: &[&str]) -> BTreeSet<String> {
        roles.iter().map(|r| r.to_string()).collect()
    }

    #[test]
    fn test_merges_realm_and_client_roles() {
        let claims = claims(json!({
            "realm_access": { "roles": ["USER", "offline_access"] },
            "resource_access": {
                "ems-api": { "roles": ["ADMIN"] },
                "other-client": { "roles": ["IGNORED"] }
            }
        }));

        let roles = extract_roles(&claims, &RoleClaimsConfig::default());
        assert_eq!(roles, set(&["ROLE_ADMIN", "ROLE_USER", "ROLE_offline_access"]));
    }

    #[test]
    fn test_prefix_not_doubled_in_either_source() {
        let claims = claims(json!({
            "realm_access": { "roles": ["ROLE_USER", "USER"] },
            "resource_access": { "ems-api": { "roles": ["ROLE_ADMIN", "ADMIN", "USER"] } }
        }));

        let roles = extract_roles(&claims, &RoleClaimsConfig::default());
        assert_eq!(roles, set(&["ROLE_ADMIN", "ROLE_USER"]));
    }

    #[test]
    fn test_configured_client_id() {
        let claims = claims(json!({
            "resource_access": { "billing": { "roles": ["AUDITOR"] } }
        }));
        let config = RoleClaimsConfig {
            client_id: "billing".into(),
            ..RoleClaimsConfig::default()
        };

        assert_eq!(extract_roles(&claims, &config), set(&["ROLE_AUDITOR"]));
    }

    #[test]
    fn test_malformed_sections_yield_empty() {
        let cases = [
            json!({}),
            json!({ "realm_access": null }),
            json!({ "realm_access": "USER" }),
            json!({ "realm_access": { "roles": "USER" } }),
            json!({ "realm_access": { "roles": [1, true, null, {"x": 1}] } }),
            json!({ "resource_access": ["ems-api"] }),
            json!({ "resource_access": { "ems-api": { "roles": null } } }),
            json!({ "realm_access": { "roles": ["", "   ", "ROLE_"] } }),
        ];

        for case in cases {
            let roles = extract_roles(&claims(case.clone()), &RoleClaimsConfig::default());
            assert!(roles.is_empty(), "expected no roles for {case}");
        }
    }

    #[test]
    fn test_one_bad_source_does_not_hide_the_other() {
        let claims = claims(json!({
            "realm_access": { "roles": 42 },
            "resource_access": { "ems-api": { "roles": ["USER"] } }
        }));

        assert_eq!(
            extract_roles(&claims, &RoleClaimsConfig::default()),
            set(&["ROLE_USER"])
        );
    }

    #[test]
    fn test_normalize_role() {
        assert_eq!(normalize_role("ADMIN").as_deref(), Some("ROLE_ADMIN"));
        assert_eq!(normalize_role(" ROLE_ADMIN ").as_deref(), Some("ROLE_ADMIN"));
        assert_eq!(normalize_role("  "), None);
    }

    proptest! {
        #[test]
        fn prop_extraction_is_deterministic_and_normalized(
            realm in proptest::collection::vec("(ROLE_)?[A-Za-z]{1,8}", 0..6),
            client in proptest::collection::vec("(ROLE_)?[A-Za-z]{1,8}", 0..6),
        ) {
            let claims = claims(json!({
                "realm_access": { "roles": realm },
                "resource_access": { "ems-api": { "roles": client } }
            }));
            let config = RoleClaimsConfig::default();

            let first = extract_roles(&claims, &config);
            let second = extract_roles(&claims, &config);
            prop_assert_eq!(&first, &second);

            for role in &first {
                prop_assert!(role.starts_with(ROLE_PREFIX));
                prop_assert!(!role[ROLE_PREFIX.len()..].starts_with(ROLE_PREFIX));
            }
        }

        #[test]
        fn prop_normalize_is_idempotent(role in "(ROLE_)?[A-Za-z_ ]{0,10}") {
            if let Some(once) = normalize_role(&role) {
                prop_assert_eq!(normalize_role(&once), Some(once.clone()));
            }
        }

        #[test]
        fn prop_reapplying_to_extracted_roles_is_stable(
            roles in proptest::collection::vec("[A-Z]{1,6}", 0..6),
        ) {
            let config = RoleClaimsConfig::default();
            let first = extract_roles(&claims(json!({ "realm_access": { "roles": roles } })), &config);
            let again: Vec<&String> = first.iter().collect();
            let second = extract_roles(&claims(json!({ "realm_access": { "roles": again } })), &config);
            prop_assert_eq!(first, second);
        }
    }
}
