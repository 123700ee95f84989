//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::auth::claims::RoleClaimsConfig;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Identity token validation and role claim locations.
    pub auth: AuthConfig,

    /// Ordered route authorization rules. First match wins.
    pub policy: Vec<PolicyRuleConfig>,

    /// Forwarding routes mapping path prefixes to peers.
    pub routes: Vec<RouteConfig>,

    /// Downstream peer services.
    pub peers: Vec<PeerConfig>,

    /// Defaults for outbound peer calls.
    pub downstream: DownstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Health reporting and probing.
    pub health: HealthConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// CORS and body limits.
    pub security: SecurityConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            auth: AuthConfig::default(),
            policy: default_policy(),
            routes: vec![
                RouteConfig::new("departments", "/department-service", "department-service"),
                RouteConfig::new("employees", "/employee-service", "employee-service"),
            ],
            peers: vec![
                PeerConfig::new("department-service", "http://127.0.0.1:8081"),
                PeerConfig::new("employee-service", "http://127.0.0.1:8082"),
            ],
            downstream: DownstreamConfig::default(),
            timeouts: TimeoutConfig::default(),
            health: HealthConfig::default(),
            observability: ObservabilityConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Look up a peer definition by name.
    pub fn peer(&self, name: &str) -> Option<&PeerConfig> {
        self.peers.iter().find(|p| p.name == name)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Bearer token validation settings.
///
/// Exactly one of `hmac_secret` or `rsa_public_key_path` must be set.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared secret for HS256-signed tokens.
    pub hmac_secret: Option<String>,

    /// Path to a PEM-encoded RSA public key for RS256-signed tokens.
    pub rsa_public_key_path: Option<String>,

    /// Expected `iss` claim, checked when set.
    pub issuer: Option<String>,

    /// Expected `aud` claim, checked when set.
    pub audience: Option<String>,

    /// Clock skew tolerance for `exp`/`nbf`, in seconds.
    pub leeway_secs: u64,

    /// Where roles live inside the token claims.
    pub claims: RoleClaimsConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            hmac_secret: None,
            rsa_public_key_path: None,
            issuer: None,
            audience: None,
            leeway_secs: 30,
            claims: RoleClaimsConfig::default(),
        }
    }
}

/// Access level granted by a policy rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessKind {
    /// No principal required.
    Public,
    /// Any valid principal.
    Authenticated,
    /// A principal holding at least one of `roles`.
    Roles,
}

/// One route authorization rule.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolicyRuleConfig {
    /// Ant-style path pattern (`/admin/**`, `/items/*/details`).
    pub pattern: String,

    /// HTTP methods this rule applies to. Empty = all methods.
    #[serde(default)]
    pub methods: Vec<String>,

    /// Access level.
    pub access: AccessKind,

    /// Allowed roles for `access = "roles"`.
    #[serde(default)]
    pub roles: Vec<String>,
}

impl PolicyRuleConfig {
    pub fn public(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            methods: Vec::new(),
            access: AccessKind::Public,
            roles: Vec::new(),
        }
    }

    pub fn authenticated(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            methods: Vec::new(),
            access: AccessKind::Authenticated,
            roles: Vec::new(),
        }
    }

    pub fn roles(pattern: &str, roles: &[&str]) -> Self {
        Self {
            pattern: pattern.to_string(),
            methods: Vec::new(),
            access: AccessKind::Roles,
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    /// Restrict the rule to the given methods.
    pub fn with_methods(mut self, methods: &[&str]) -> Self {
        self.methods = methods.iter().map(|m| m.to_string()).collect();
        self
    }
}

/// Policy used when the config file has no `[[policy]]` entries.
pub fn default_policy() -> Vec<PolicyRuleConfig> {
    vec![
        PolicyRuleConfig::public("/actuator/**"),
        PolicyRuleConfig::public("/auth/**"),
        PolicyRuleConfig::public("/login/**"),
        PolicyRuleConfig::public("/v3/api-docs/**"),
        PolicyRuleConfig::public("/swagger-ui/**"),
        PolicyRuleConfig::public("/swagger-ui.html"),
        PolicyRuleConfig::roles("/department-service/**", &["ADMIN"])
            .with_methods(&["POST", "PUT", "DELETE"]),
        PolicyRuleConfig::roles("/employee-service/**", &["ADMIN"])
            .with_methods(&["POST", "PUT", "DELETE"]),
        PolicyRuleConfig::roles("/department-service/**", &["USER", "ADMIN"]),
        PolicyRuleConfig::roles("/employee-service/**", &["USER", "ADMIN"]),
        PolicyRuleConfig::roles("/api/**", &["USER", "ADMIN"]),
    ]
}

/// Forwarding route mapping a path prefix to a peer.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Path prefix to match, on segment boundaries.
    pub path_prefix: String,

    /// Peer name to forward to.
    pub peer: String,

    /// Remove the prefix before forwarding.
    #[serde(default = "default_true")]
    pub strip_prefix: bool,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,
}

impl RouteConfig {
    pub fn new(name: &str, path_prefix: &str, peer: &str) -> Self {
        Self {
            name: name.to_string(),
            path_prefix: path_prefix.to_string(),
            peer: peer.to_string(),
            strip_prefix: true,
            priority: 0,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Downstream peer definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PeerConfig {
    /// Unique peer name (also the dependency name in health reports).
    pub name: String,

    /// Base URLs of the peer instances (e.g., "http://127.0.0.1:8081").
    pub urls: Vec<String>,

    /// Per-attempt timeout override in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Attempt count override for replayable calls.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl PeerConfig {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            urls: vec![url.to_string()],
            timeout_ms: None,
            max_attempts: None,
        }
    }
}

/// Defaults for outbound peer calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DownstreamConfig {
    /// Per-attempt deadline in milliseconds.
    pub timeout_ms: u64,

    /// Attempts for replayable calls (1 = no retry).
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for DownstreamConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 3_000,
            max_attempts: 1,
            base_delay_ms: 100,
            max_delay_ms: 2_000,
        }
    }
}

/// Timeout configuration for inbound handling.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout for forwarded requests, in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Health reporting and active probing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Interval of the periodic health report log, in seconds.
    pub report_interval_secs: u64,

    /// Enable active probing of peers.
    pub probe_enabled: bool,

    /// Probe interval in seconds.
    pub probe_interval_secs: u64,

    /// Probe timeout in seconds.
    pub probe_timeout_secs: u64,

    /// Path probed on each peer.
    pub probe_path: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 300,
            probe_enabled: false,
            probe_interval_secs: 10,
            probe_timeout_secs: 2,
            probe_path: "/actuator/health".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Requests slower than this emit an extra warning.
    pub slow_request_ms: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
            slow_request_ms: 5_000,
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,

    /// Allowed CORS origins; `"*"` allows any.
    pub cors_allowed_origins: Vec<String>,

    /// Allowed CORS methods.
    pub cors_allowed_methods: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
            cors_allowed_origins: vec!["*".to_string()],
            cors_allowed_methods: ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}
