use std::future::Future;
use std::time::{Duration, Instant};

use crate::error::{DiscussionError, DiscussionResult};

/// Absolute point in time by which a call must finish.
///
/// Store writes check it immediately before COMMIT, so an expired call
/// rolls back instead of leaving a half-applied mutation behind.
#[derive(Debug, Clone, Copy)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self(Instant::now() + budget)
    }

    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.0
    }

    pub fn check(&self) -> DiscussionResult<()> {
        if self.is_expired() {
            Err(DiscussionError::Timeout)
        } else {
            Ok(())
        }
    }

    /// Bound a future (typically a collaborator lookup) by the remaining budget
    pub async fn run<F, T>(&self, fut: F) -> DiscussionResult<T>
    where
        F: Future<Output = DiscussionResult<T>>,
    {
        tokio::time::timeout(self.remaining(), fut)
            .await
            .map_err(|_| DiscussionError::Timeout)?
    }
}
