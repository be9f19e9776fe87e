//! Participant bookkeeping applied on read and write access.

use chrono::{DateTime, Utc};

use crate::deadline::Deadline;
use crate::error::DiscussionResult;
use crate::model::{Discussion, Participant};
use crate::storage::DiscussionStore;

/// Refresh `last_seen` for an existing participant or append a new one.
/// Repeated touches by the same user never grow the list.
pub fn apply_touch(participants: &mut Vec<Participant>, user_id: &str, now: DateTime<Utc>) {
    match participants.iter_mut().find(|p| p.user_id == user_id) {
        Some(existing) => existing.last_seen = existing.last_seen.max(now),
        None => participants.push(Participant::joined(user_id, now)),
    }
}

#[derive(Clone)]
pub struct PresenceTracker {
    store: DiscussionStore,
}

impl PresenceTracker {
    pub fn new(store: DiscussionStore) -> Self {
        Self { store }
    }

    /// Persist the touch atomically, then mirror it onto the loaded snapshot
    pub async fn touch(
        &self,
        discussion: &mut Discussion,
        user_id: &str,
        deadline: Deadline,
    ) -> DiscussionResult<()> {
        let now = crate::model::now();
        self.store.touch(discussion.id, user_id, now, deadline).await?;
        apply_touch(&mut discussion.participants, user_id, now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_touch_is_idempotent_in_length() {
        let now = Utc::now();
        let mut participants = vec![Participant::joined("s1", now)];

        apply_touch(&mut participants, "t1", now);
        let after_one = participants.len();
        apply_touch(&mut participants, "t1", now + Duration::seconds(1));
        apply_touch(&mut participants, "t1", now + Duration::seconds(2));

        assert_eq!(participants.len(), after_one);
        assert_eq!(participants[1].joined_at, now);
        assert_eq!(participants[1].last_seen, now + Duration::seconds(2));
    }

    #[test]
    fn test_last_seen_does_not_move_backwards() {
        let now = Utc::now();
        let mut participants = vec![Participant::joined("s1", now)];
        apply_touch(&mut participants, "s1", now - Duration::minutes(5));
        assert_eq!(participants[0].last_seen, now);
    }
}
