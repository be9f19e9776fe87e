//! Request-scoped extractors: who is calling, and how long they will wait.

use std::time::Duration;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName};

use super::api::AppState;
use crate::deadline::Deadline;
use crate::error::DiscussionError;

pub const TIMEOUT_HEADER: &str = "x-request-timeout-ms";

/// Resolves an inbound request to an actor id
pub trait AuthenticationContext: Send + Sync {
    fn resolve(&self, headers: &HeaderMap) -> Option<String>;
}

/// Trusts an identity header set by an upstream gateway
pub struct HeaderAuthenticator {
    header: HeaderName,
}

impl HeaderAuthenticator {
    pub fn new(header: &str) -> anyhow::Result<Self> {
        let header = HeaderName::from_bytes(header.trim().to_ascii_lowercase().as_bytes())?;
        Ok(Self { header })
    }
}

impl AuthenticationContext for HeaderAuthenticator {
    fn resolve(&self, headers: &HeaderMap) -> Option<String> {
        let value = headers.get(&self.header)?.to_str().ok()?.trim();
        (!value.is_empty()).then(|| value.to_string())
    }
}

/// Default and ceiling for caller-supplied timeouts
#[derive(Debug, Clone, Copy)]
pub struct RequestTimeouts {
    pub default: Duration,
    pub max: Duration,
}

/// Authenticated actor; required on every mutating route
#[derive(Debug, Clone)]
pub struct Actor(pub String);

/// Optional actor on read routes, used for presence
#[derive(Debug, Clone)]
pub struct Viewer(pub Option<String>);

#[derive(Debug, Clone, Copy)]
pub struct CallDeadline(pub Deadline);

impl FromRequestParts<AppState> for Actor {
    type Rejection = DiscussionError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        state
            .auth
            .resolve(&parts.headers)
            .map(Actor)
            .ok_or(DiscussionError::Unauthenticated)
    }
}

impl FromRequestParts<AppState> for Viewer {
    type Rejection = DiscussionError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Viewer(state.auth.resolve(&parts.headers)))
    }
}

impl FromRequestParts<AppState> for CallDeadline {
    type Rejection = DiscussionError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let budget = requested_timeout(&parts.headers, state.timeouts)?;
        Ok(CallDeadline(Deadline::after(budget)))
    }
}

fn requested_timeout(
    headers: &HeaderMap,
    timeouts: RequestTimeouts,
) -> Result<Duration, DiscussionError> {
    let Some(raw) = headers.get(TIMEOUT_HEADER) else {
        return Ok(timeouts.default);
    };

    let millis: u64 = raw
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .filter(|ms| *ms > 0)
        .ok_or_else(|| {
            DiscussionError::invalid(format!("{TIMEOUT_HEADER} must be a positive integer"))
        })?;

    Ok(Duration::from_millis(millis).min(timeouts.max))
}
