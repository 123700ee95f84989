//! Bearer token validation.
//!
//! # Responsibilities
//! - Pull the bearer credential out of the `Authorization` header
//! - Verify signature, expiry and (optionally) issuer/audience
//! - Hand the raw claims to the role extractor
//!
//! # Design Decisions
//! - Verification is synchronous and side-effect free
//! - A bad token is an error value, never a panic; callers decide whether
//!   the route needs a principal at all

use std::fs;

use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::auth::claims::RoleClaimsConfig;
use crate::auth::principal::Principal;
use crate::config::AuthConfig;

/// Reasons a token could not be turned into claims.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("no key material configured")]
    NotConfigured,

    #[error("failed to read key file {path}: {source}")]
    KeyFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid key: {0}")]
    InvalidKey(#[source] jsonwebtoken::errors::Error),

    #[error("token rejected: {0}")]
    Rejected(#[from] jsonwebtoken::errors::Error),
}

/// Validates a bearer credential and returns its claims.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Map<String, Value>, TokenError>;
}

/// JWT verifier backed by a static HS256 secret or RS256 public key.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("algorithms", &self.validation.algorithms)
            .field("issuer", &self.validation.iss)
            .finish()
    }
}

impl JwtVerifier {
    /// Build a verifier from the auth section of the config.
    pub fn from_config(config: &AuthConfig) -> Result<Self, TokenError> {
        let (key, algorithm) = match (&config.hmac_secret, &config.rsa_public_key_path) {
            (Some(secret), _) => (DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256),
            (None, Some(path)) => {
                let pem = fs::read(path).map_err(|source| TokenError::KeyFile {
                    path: path.clone(),
                    source,
                })?;
                let key = DecodingKey::from_rsa_pem(&pem).map_err(TokenError::InvalidKey)?;
                (key, Algorithm::RS256)
            }
            (None, None) => return Err(TokenError::NotConfigured),
        };

        let mut validation = Validation::new(algorithm);
        validation.leeway = config.leeway_secs;
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Ok(Self { key, validation })
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<Map<String, Value>, TokenError> {
        let data = decode::<Map<String, Value>>(token, &self.key, &self.validation)?;
        Ok(data.claims)
    }
}

/// Extract the bearer credential from request headers.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Turns request headers into an optional principal.
pub struct Authenticator {
    verifier: Box<dyn TokenVerifier>,
    claims: RoleClaimsConfig,
}

impl Authenticator {
    pub fn new(verifier: Box<dyn TokenVerifier>, claims: RoleClaimsConfig) -> Self {
        Self { verifier, claims }
    }

    /// Resolve the principal for a request.
    ///
    /// Missing or invalid credentials yield `None`; the route policy decides
    /// whether that is acceptable.
    pub fn authenticate(&self, headers: &HeaderMap) -> Option<Principal> {
        let token = bearer_token(headers)?;
        match self.verifier.verify(token) {
            Ok(claims) => Some(Principal::from_claims(claims, &self.claims)),
            Err(e) => {
                tracing::debug!(error = %e, "Bearer token rejected");
                None
            }
        }
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("claims", &self.claims)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "unit-test-secret";

    fn config() -> AuthConfig {
        AuthConfig {
            hmac_secret: Some(SECRET.into()),
            issuer: Some("https://idp.example/realms/ems".into()),
            ..AuthConfig::default()
        }
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn sign(claims: Value) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_valid_token() {
        let verifier = JwtVerifier::from_config(&config()).unwrap();
        let token = sign(json!({
            "sub": "u1",
            "iss": "https://idp.example/realms/ems",
            "exp": now() + 300,
        }));

        let claims = verifier.verify(&token).unwrap();
        assert_eq!(claims["sub"], "u1");
    }

    #[test]
    fn test_expired_token_rejected() {
        let verifier = JwtVerifier::from_config(&config()).unwrap();
        let token = sign(json!({
            "sub": "u1",
            "iss": "https://idp.example/realms/ems",
            "exp": now() - 3600,
        }));

        assert!(matches!(verifier.verify(&token), Err(TokenError::Rejected(_))));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let verifier = JwtVerifier::from_config(&config()).unwrap();
        let token = sign(json!({ "sub": "u1", "iss": "https://evil", "exp": now() + 300 }));

        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn test_wrong_signature_rejected() {
        let verifier = JwtVerifier::from_config(&config()).unwrap();
        let token = encode(
            &Header::default(),
            &json!({ "sub": "u1", "iss": "https://idp.example/realms/ems", "exp": now() + 300 }),
            &EncodingKey::from_secret(b"another-secret"),
        )
        .unwrap();

        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn test_not_configured() {
        let err = JwtVerifier::from_config(&AuthConfig::default()).unwrap_err();
        assert!(matches!(err, TokenError::NotConfigured));
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&headers_with("Bearer abc.def")), Some("abc.def"));
        assert_eq!(bearer_token(&headers_with("bearer   abc.def ")), Some("abc.def"));
        assert_eq!(bearer_token(&headers_with("Basic dXNlcg==")), None);
        assert_eq!(bearer_token(&headers_with("Bearer")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_authenticator_builds_principal() {
        let verifier = JwtVerifier::from_config(&config()).unwrap();
        let authenticator = Authenticator::new(Box::new(verifier), RoleClaimsConfig::default());
        let token = sign(json!({
            "sub": "u1",
            "iss": "https://idp.example/realms/ems",
            "exp": now() + 300,
            "resource_access": { "ems-api": { "roles": ["ADMIN"] } }
        }));

        let principal = authenticator
            .authenticate(&headers_with(&format!("Bearer {token}")))
            .unwrap();
        assert!(principal.has_role("ADMIN"));

        assert!(authenticator
            .authenticate(&headers_with("Bearer not-a-jwt"))
            .is_none());
    }
}
