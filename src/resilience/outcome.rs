//! Result of one downstream call.

use crate::http::error::ApiError;

/// Why a downstream call produced no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The peer answered and reported the resource absent. Not a fault.
    NotFound,
    /// Timeout, refused connection, 5xx, protocol or decode error.
    Unavailable,
    /// The exchange failed without the peer being at fault: the peer refused
    /// the caller's request with a 4xx other than 404, or the inbound body
    /// could not be read. Leaves the peer's health as it was.
    Rejected,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Unavailable => "unavailable",
            Self::Rejected => "rejected",
        }
    }
}

/// Outcome of a resilient call. Produced per call, never shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCallOutcome<T> {
    Success(T),
    Failed(FailureKind),
}

impl<T> ServiceCallOutcome<T> {
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn result(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failed(_) => None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success(_) => None,
            Self::Failed(kind) => Some(*kind),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ServiceCallOutcome<U> {
        match self {
            Self::Success(value) => ServiceCallOutcome::Success(f(value)),
            Self::Failed(kind) => ServiceCallOutcome::Failed(kind),
        }
    }

    /// Resolve into the caller-visible error taxonomy.
    ///
    /// `resource` names what was looked up, for the not-found message.
    pub fn into_result(self, peer: &str, resource: &str) -> Result<T, ApiError> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failed(FailureKind::NotFound) => {
                Err(ApiError::ResourceNotFound(format!("{resource} not found")))
            }
            Self::Failed(FailureKind::Unavailable) => Err(ApiError::DependencyUnavailable {
                peer: peer.to_string(),
            }),
            Self::Failed(FailureKind::Rejected) => Err(ApiError::AuthorizationDenied),
        }
    }
}
