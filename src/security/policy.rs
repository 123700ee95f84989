//! Route authorization policy.
//!
//! # Responsibilities
//! - Compile `[[policy]]` entries into an ordered rule table
//! - Decide allow/deny for (path, method, principal)
//!
//! # Design Decisions
//! - First matching rule wins; unmatched paths require authentication
//! - Patterns are Ant-style and compiled to segments at startup
//! - Deny carries the reason so the error layer can pick 401 vs 403

use std::collections::BTreeSet;

use axum::http::Method;

use crate::auth::claims::normalize_role;
use crate::auth::principal::Principal;
use crate::config::{AccessKind, PolicyRuleConfig};

/// One segment of a compiled path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// `**`: zero or more whole segments.
    AnyDepth,
    /// A segment with `*` wildcards, split on `*`.
    Wildcard(Vec<String>),
    Literal(String),
}

/// Ant-style path pattern.
///
/// `/admin/**` matches `/admin`, `/admin/x` and `/admin/x/y`;
/// `/items/*/details` matches exactly one segment in the middle;
/// `/swagger-ui*.html` matches within a single segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn new(pattern: &str) -> Self {
        let segments = split_path(pattern)
            .map(|seg| match seg {
                "**" => Segment::AnyDepth,
                s if s.contains('*') => {
                    Segment::Wildcard(s.split('*').map(str::to_string).collect())
                }
                s => Segment::Literal(s.to_string()),
            })
            .collect();
        Self {
            raw: pattern.to_string(),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, path: &str) -> bool {
        let parts: Vec<&str> = split_path(path).collect();
        match_segments(&self.segments, &parts)
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn match_segments(pattern: &[Segment], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((Segment::AnyDepth, rest)) => {
            (0..=path.len()).any(|skip| match_segments(rest, &path[skip..]))
        }
        Some((segment, rest)) => match path.split_first() {
            Some((head, tail)) => segment_matches(segment, head) && match_segments(rest, tail),
            None => false,
        },
    }
}

fn segment_matches(segment: &Segment, value: &str) -> bool {
    match segment {
        Segment::Literal(lit) => lit == value,
        Segment::Wildcard(pieces) => wildcard_matches(pieces, value),
        Segment::AnyDepth => true,
    }
}

/// `pieces` is the segment split on `*`; the first piece anchors the start,
/// the last anchors the end, the middle ones must appear in order.
fn wildcard_matches(pieces: &[String], value: &str) -> bool {
    let (first, last) = match (pieces.first(), pieces.last()) {
        (Some(first), Some(last)) if pieces.len() > 1 => (first, last),
        _ => return pieces.first().is_some_and(|p| p == value),
    };
    if value.len() < first.len() + last.len()
        || !value.starts_with(first.as_str())
        || !value.ends_with(last.as_str())
    {
        return false;
    }
    let mut rest = &value[first.len()..value.len() - last.len()];
    for piece in &pieces[1..pieces.len() - 1] {
        match rest.find(piece.as_str()) {
            Some(idx) => rest = &rest[idx + piece.len()..],
            None => return false,
        }
    }
    true
}

/// What a matching rule requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessRule {
    Public,
    Authenticated,
    /// At least one of these (normalized) roles.
    AnyRole(BTreeSet<String>),
}

/// Why a request was denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// No valid principal where one is required.
    Unauthenticated,
    /// Principal present but holds none of the required roles.
    InsufficientRole { required: BTreeSet<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

#[derive(Debug, Clone)]
struct PolicyRule {
    pattern: PathPattern,
    methods: Vec<Method>,
    access: AccessRule,
}

impl PolicyRule {
    fn applies(&self, path: &str, method: &Method) -> bool {
        (self.methods.is_empty() || self.methods.contains(method)) && self.pattern.matches(path)
    }
}

/// Ordered, immutable rule table.
#[derive(Debug, Clone, Default)]
pub struct RoutePolicy {
    rules: Vec<PolicyRule>,
}

impl RoutePolicy {
    /// Compile rules from config. Unknown methods are dropped (validation
    /// rejects them before this point).
    pub fn from_config(rules: &[PolicyRuleConfig]) -> Self {
        let rules = rules
            .iter()
            .map(|rule| PolicyRule {
                pattern: PathPattern::new(&rule.pattern),
                methods: rule
                    .methods
                    .iter()
                    .filter_map(|m| Method::from_bytes(m.to_ascii_uppercase().as_bytes()).ok())
                    .collect(),
                access: match rule.access {
                    AccessKind::Public => AccessRule::Public,
                    AccessKind::Authenticated => AccessRule::Authenticated,
                    AccessKind::Roles => AccessRule::AnyRole(
                        rule.roles.iter().filter_map(|r| normalize_role(r)).collect(),
                    ),
                },
            })
            .collect();
        Self { rules }
    }

    /// Rule that applies to this request; `Authenticated` when none match.
    pub fn rule_for(&self, path: &str, method: &Method) -> &AccessRule {
        const FALLBACK: &AccessRule = &AccessRule::Authenticated;
        self.rules
            .iter()
            .find(|rule| rule.applies(path, method))
            .map(|rule| &rule.access)
            .unwrap_or(FALLBACK)
    }

    pub fn decide(&self, path: &str, method: &Method, principal: Option<&Principal>) -> Decision {
        match (self.rule_for(path, method), principal) {
            (AccessRule::Public, _) => Decision::Allow,
            (_, None) => Decision::Deny(DenyReason::Unauthenticated),
            (AccessRule::Authenticated, Some(_)) => Decision::Allow,
            (AccessRule::AnyRole(required), Some(principal)) => {
                if principal.roles().iter().any(|r| required.contains(r)) {
                    Decision::Allow
                } else {
                    Decision::Deny(DenyReason::InsufficientRole {
                        required: required.clone(),
                    })
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
