use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::cache::DiscussionCache;
use super::db::{Database, DiscussionHeader};
use crate::deadline::Deadline;
use crate::error::DiscussionResult;
use crate::model::{
    Discussion, DiscussionFilter, DiscussionSummary, Message, Reaction, ReactionToggle,
};
use crate::paging::PageRequest;

/// Async boundary over [`Database`].
///
/// SQLite work runs on the blocking pool; every successful write
/// invalidates the cached aggregate for its discussion before returning,
/// so a caller's follow-up read observes its own write.
#[derive(Clone)]
pub struct DiscussionStore {
    db: Arc<Database>,
    cache: Arc<DiscussionCache>,
}

impl DiscussionStore {
    pub fn new(db: Arc<Database>, cache_capacity: usize) -> Self {
        Self {
            db,
            cache: Arc::new(DiscussionCache::new(cache_capacity)),
        }
    }

    async fn blocking<T, F>(&self, f: F) -> DiscussionResult<T>
    where
        F: FnOnce(&Database) -> DiscussionResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    pub async fn create(
        &self,
        discussion: Discussion,
        deadline: Deadline,
    ) -> DiscussionResult<Discussion> {
        let discussion = self
            .blocking(move |db| {
                db.insert_discussion(&discussion, deadline)?;
                Ok(discussion)
            })
            .await?;
        self.cache.invalidate(&discussion.id);
        Ok(discussion)
    }

    pub async fn get(&self, id: Uuid, deadline: Deadline) -> DiscussionResult<Option<Discussion>> {
        if let Some(hit) = self.cache.get(&id) {
            tracing::trace!(discussion = %id, "cache hit");
            return Ok(Some(hit));
        }

        let ticket = self.cache.ticket();
        let loaded = self
            .blocking(move |db| db.load_discussion(id, deadline))
            .await?;
        if let Some(discussion) = &loaded {
            self.cache.insert_if_current(discussion.clone(), ticket);
        }
        Ok(loaded)
    }

    pub async fn header(
        &self,
        id: Uuid,
        deadline: Deadline,
    ) -> DiscussionResult<Option<DiscussionHeader>> {
        if let Some(hit) = self.cache.get(&id) {
            return Ok(Some(DiscussionHeader {
                course_id: hit.course_id,
                is_active: hit.is_active,
            }));
        }
        self.blocking(move |db| db.load_header(id, deadline)).await
    }

    pub async fn message(
        &self,
        discussion_id: Uuid,
        message_id: Uuid,
        deadline: Deadline,
    ) -> DiscussionResult<Option<Message>> {
        self.blocking(move |db| db.load_message(discussion_id, message_id, deadline))
            .await
    }

    /// One listing page plus the total number of matching discussions
    pub async fn list_active(
        &self,
        course_id: &str,
        filter: &DiscussionFilter,
        request: PageRequest,
        deadline: Deadline,
    ) -> DiscussionResult<(Vec<DiscussionSummary>, usize)> {
        let course_id = course_id.to_string();
        let filter = filter.clone();
        self.blocking(move |db| db.list_active(&course_id, &filter, request, deadline))
            .await
    }

    pub async fn append_message(
        &self,
        discussion_id: Uuid,
        mut message: Message,
        deadline: Deadline,
    ) -> DiscussionResult<Message> {
        let message = self
            .blocking(move |db| {
                db.append_message(discussion_id, &mut message, deadline)?;
                Ok(message)
            })
            .await?;
        self.cache.invalidate(&discussion_id);
        Ok(message)
    }

    pub async fn toggle_reaction(
        &self,
        discussion_id: Uuid,
        message_id: Uuid,
        reaction: Reaction,
        deadline: Deadline,
    ) -> DiscussionResult<(Message, ReactionToggle)> {
        let result = self
            .blocking(move |db| db.toggle_reaction(discussion_id, message_id, &reaction, deadline))
            .await?;
        self.cache.invalidate(&discussion_id);
        Ok(result)
    }

    pub async fn delete_message(
        &self,
        discussion_id: Uuid,
        message_id: Uuid,
        now: DateTime<Utc>,
        deadline: Deadline,
    ) -> DiscussionResult<()> {
        self.blocking(move |db| db.delete_message(discussion_id, message_id, now, deadline))
            .await?;
        self.cache.invalidate(&discussion_id);
        Ok(())
    }

    pub async fn touch(
        &self,
        discussion_id: Uuid,
        user_id: &str,
        now: DateTime<Utc>,
        deadline: Deadline,
    ) -> DiscussionResult<()> {
        let user_id = user_id.to_string();
        self.blocking(move |db| db.touch_participant(discussion_id, &user_id, now, deadline))
            .await?;
        self.cache.invalidate(&discussion_id);
        Ok(())
    }

    pub async fn set_pinned(
        &self,
        discussion_id: Uuid,
        pinned: bool,
        now: DateTime<Utc>,
        deadline: Deadline,
    ) -> DiscussionResult<()> {
        self.blocking(move |db| db.set_pinned(discussion_id, pinned, now, deadline))
            .await?;
        self.cache.invalidate(&discussion_id);
        Ok(())
    }
}
