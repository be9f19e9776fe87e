//! Error Handling and Read Retry Logic
//!
//! Provides the error taxonomy shared by the service, store and HTTP layer,
//! plus a bounded retry helper for read paths.

use std::future::Future;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tokio::time::sleep;

use crate::deadline::Deadline;

/// Result alias used across the discussion engine
pub type DiscussionResult<T> = Result<T, DiscussionError>;

/// Categorized failures, each with a fixed HTTP mapping
#[derive(Debug, thiserror::Error)]
pub enum DiscussionError {
    /// Course, discussion or message absent
    #[error("{0}")]
    NotFound(String),

    /// Actor is not enrolled, not the author, or not the teacher
    #[error("{0}")]
    Forbidden(String),

    /// Missing required content/fileUrl, invalid page or limit
    #[error("{0}")]
    InvalidArgument(String),

    /// Mutating call without an authenticated actor
    #[error("Authentication required")]
    Unauthenticated,

    /// Concurrent mutation detected at the store boundary
    #[error("{0}")]
    Conflict(String),

    /// Call deadline elapsed before the operation could complete
    #[error("Request timed out")]
    Timeout,

    /// Store or connectivity failure; detail is logged, never returned
    #[error("Internal server error")]
    Internal(#[source] anyhow::Error),
}

impl DiscussionError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden(reason.into())
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArgument(reason.into())
    }

    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Only transient store failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Internal(_))
    }
}

impl From<rusqlite::Error> for DiscussionError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked) => {
                Self::Conflict("Discussion is being modified concurrently, please resubmit".into())
            }
            _ => Self::Internal(err.into()),
        }
    }
}

impl From<tokio::task::JoinError> for DiscussionError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(anyhow::anyhow!("failed to join database task: {err}"))
    }
}

impl From<serde_json::Error> for DiscussionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(err.into())
    }
}

impl IntoResponse for DiscussionError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let Self::Internal(source) = &self {
            tracing::error!(error = ?source, "request failed with internal error");
        } else {
            tracing::debug!(%status, error = %self, "request rejected");
        }

        let body = serde_json::json!({
            "success": false,
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,

    /// Initial delay between retries
    #[serde(with = "millis")]
    pub initial_delay: Duration,

    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,

    /// Maximum delay between retries
    #[serde(with = "millis")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(20),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(500),
        }
    }
}

/// Execute a read with retry logic.
///
/// Gives up early when the error is not retryable or when the next backoff
/// would overrun `deadline`. Never use this for writes: appends are not
/// idempotent.
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    deadline: Deadline,
    mut operation: F,
) -> DiscussionResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DiscussionResult<T>>,
{
    let mut attempts = 0;
    let mut delay = policy.initial_delay;

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !e.is_retryable()
                    || attempts >= policy.max_attempts
                    || deadline.remaining() <= delay
                {
                    return Err(e);
                }

                tracing::warn!(
                    attempt = attempts,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "read failed, retrying in {:?}",
                    delay
                );

                sleep(delay).await;

                // Exponential backoff
                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * policy.backoff_multiplier)
                        .min(policy.max_delay.as_secs_f64()),
                );
            }
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        u64::deserialize(de).map(Duration::from_millis)
    }
}
