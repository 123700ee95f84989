//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled forwarding routes
//! - Look up the route for a path and compute the peer-side path
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) prefix scan (acceptable for typical route counts)
//! - Higher priority first; among equals, longer prefix first
//! - Explicit `None` rather than a silent default

use crate::config::RouteConfig;
use crate::routing::matcher::PathPrefixMatcher;

#[derive(Debug, Clone)]
pub struct Route {
    pub name: String,
    pub peer: String,
    pub strip_prefix: bool,
    priority: u32,
    matcher: PathPrefixMatcher,
}

/// A matched route and the path to send to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    pub route: &'a str,
    pub peer: &'a str,
    pub upstream_path: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProxyRouter {
    routes: Vec<Route>,
}

impl ProxyRouter {
    pub fn from_config(routes: &[RouteConfig]) -> Self {
        let mut routes: Vec<Route> = routes
            .iter()
            .map(|r| Route {
                name: r.name.clone(),
                peer: r.peer.clone(),
                strip_prefix: r.strip_prefix,
                priority: r.priority,
                matcher: PathPrefixMatcher::new(r.path_prefix.as_str()),
            })
            .collect();

        routes.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.matcher.prefix().len().cmp(&a.matcher.prefix().len()))
        });

        Self { routes }
    }

    pub fn match_path(&self, path: &str) -> Option<RouteMatch<'_>> {
        let route = self.routes.iter().find(|r| r.matcher.matches(path))?;
        let upstream_path = if route.strip_prefix {
            route.matcher.strip(path)?
        } else {
            path.to_string()
        };
        Some(RouteMatch {
            route: &route.name,
            peer: &route.peer,
            upstream_path,
        })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
