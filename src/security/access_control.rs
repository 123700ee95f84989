//! Access control middleware.
//! Authenticates the bearer token and enforces the route policy.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::principal::Principal;
use crate::auth::token::{bearer_token, Authenticator};
use crate::http::error::ApiError;
use crate::observability::correlation::CorrelationContext;
use crate::security::policy::{Decision, DenyReason, RoutePolicy};

/// State required for access control.
#[derive(Clone)]
pub struct AccessControlState {
    pub authenticator: Arc<Authenticator>,
    pub policy: Arc<RoutePolicy>,
}

/// Identity attached to every request that passes the policy.
#[derive(Clone, Debug, Default)]
pub struct RequestIdentity {
    pub principal: Option<Arc<Principal>>,
    /// Raw bearer credential, relayed on peer calls.
    pub bearer: Option<String>,
}

pub async fn access_control_middleware(
    State(state): State<AccessControlState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let principal = state.authenticator.authenticate(req.headers()).map(Arc::new);

    if let Some(principal) = &principal {
        if let Some(ctx) = req
            .extensions()
            .get::<CorrelationContext>()
            .cloned()
            .or_else(CorrelationContext::current)
        {
            ctx.bind_principal(principal.display_name());
        }
    }

    let path = req.uri().path();
    match state.policy.decide(path, req.method(), principal.as_deref()) {
        Decision::Allow => {}
        Decision::Deny(DenyReason::Unauthenticated) => {
            tracing::debug!(path = %path, "No valid principal for protected route");
            return ApiError::AuthenticationRequired.into_response();
        }
        Decision::Deny(DenyReason::InsufficientRole { required }) => {
            tracing::warn!(
                path = %path,
                required = ?required,
                "Principal lacks required role"
            );
            return ApiError::AuthorizationDenied.into_response();
        }
    }

    let identity = RequestIdentity {
        bearer: principal
            .as_ref()
            .and_then(|_| bearer_token(req.headers()))
            .map(str::to_string),
        principal,
    };
    req.extensions_mut().insert(identity);
    next.run(req).await
}
