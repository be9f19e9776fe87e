//! Discussion orchestration: validation, authorization, atomic store
//! mutation, presence bookkeeping and author population.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::deadline::Deadline;
use crate::directory::{Course, CourseRegistry, UserDirectory, UserProfile};
use crate::error::{with_retry, DiscussionError, DiscussionResult, RetryPolicy};
use crate::guard;
use crate::model::{
    now, Discussion, DiscussionFilter, DiscussionSummary, Message, NewDiscussion, NewMessage,
    Reaction,
};
use crate::paging::{Page, PageRequest};
use crate::presence::PresenceTracker;
use crate::storage::{DiscussionHeader, DiscussionStore};

pub struct DiscussionService {
    store: DiscussionStore,
    presence: PresenceTracker,
    courses: Arc<dyn CourseRegistry>,
    users: Arc<dyn UserDirectory>,
    read_retry: RetryPolicy,
}

impl DiscussionService {
    pub fn new(
        store: DiscussionStore,
        courses: Arc<dyn CourseRegistry>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            presence: PresenceTracker::new(store.clone()),
            store,
            courses,
            users,
            read_retry: RetryPolicy::default(),
        }
    }

    pub fn with_read_retry(mut self, policy: RetryPolicy) -> Self {
        self.read_retry = policy;
        self
    }

    #[tracing::instrument(skip(self, input, deadline), fields(course = %input.course_id))]
    pub async fn create_discussion(
        &self,
        input: NewDiscussion,
        actor: &str,
        deadline: Deadline,
    ) -> DiscussionResult<Discussion> {
        input.validate()?;
        let course = self.course(&input.course_id, deadline).await?;
        guard::require_participant(&course, actor)?;

        let discussion = Discussion::new(input, actor, now());
        let mut discussion = self.store.create(discussion, deadline).await?;
        tracing::info!(discussion = %discussion.id, kind = %discussion.kind, "discussion created");

        self.populate_discussion(&mut discussion, deadline).await;
        Ok(discussion)
    }

    /// Active discussions of a course, pinned first, then by recent activity
    #[tracing::instrument(skip(self, filter, deadline))]
    pub async fn list_discussions(
        &self,
        course_id: &str,
        filter: DiscussionFilter,
        page: i64,
        limit: i64,
        deadline: Deadline,
    ) -> DiscussionResult<Page<DiscussionSummary>> {
        let request = PageRequest::new(page, limit)?;
        let filter = &filter;
        let (rows, total) = with_retry(&self.read_retry, deadline, move || {
            self.store.list_active(course_id, filter, request, deadline)
        })
        .await?;

        let mut page = Page::new(rows, request, total);
        let mut profiles = HashMap::new();
        for summary in &mut page.items {
            summary.creator = self
                .profile_cached(&summary.created_by, &mut profiles, deadline)
                .await;
        }
        Ok(page)
    }

    /// Full aggregate. A supplied viewer is recorded as present.
    #[tracing::instrument(skip(self, deadline))]
    pub async fn get_discussion(
        &self,
        discussion_id: Uuid,
        viewer: Option<&str>,
        deadline: Deadline,
    ) -> DiscussionResult<Discussion> {
        let mut discussion = with_retry(&self.read_retry, deadline, move || {
            self.store.get(discussion_id, deadline)
        })
        .await?
        .ok_or_else(|| DiscussionError::not_found("Discussion not found"))?;

        if let Some(viewer) = viewer {
            self.record_presence(&mut discussion, viewer, deadline).await;
        }

        self.populate_discussion(&mut discussion, deadline).await;
        Ok(discussion)
    }

    #[tracing::instrument(skip(self, input, deadline), fields(kind = %input.kind))]
    pub async fn add_message(
        &self,
        discussion_id: Uuid,
        actor: &str,
        input: NewMessage,
        deadline: Deadline,
    ) -> DiscussionResult<Message> {
        let header = self.header(discussion_id, deadline).await?;
        if !header.is_active {
            return Err(DiscussionError::forbidden("Discussion is no longer active"));
        }
        input.validate()?;

        let course = self.course(&header.course_id, deadline).await?;
        guard::require_participant(&course, actor)?;

        let message = Message::new(input, actor, now());
        let mut message = self
            .store
            .append_message(discussion_id, message, deadline)
            .await?;
        tracing::info!(message = %message.id, "message added");

        message.author = self.profile(&message.user, deadline).await;
        Ok(message)
    }

    /// Resubmitting the same emoji removes the reaction again
    #[tracing::instrument(skip(self, deadline))]
    pub async fn add_or_toggle_reaction(
        &self,
        discussion_id: Uuid,
        message_id: Uuid,
        actor: &str,
        emoji: &str,
        deadline: Deadline,
    ) -> DiscussionResult<Message> {
        let emoji = emoji.trim();
        if emoji.is_empty() {
            return Err(DiscussionError::invalid("Emoji is required"));
        }

        let header = self.header(discussion_id, deadline).await?;
        let course = self.course(&header.course_id, deadline).await?;
        guard::require_participant(&course, actor)?;

        let reaction = Reaction {
            emoji: emoji.to_string(),
            user_id: actor.to_string(),
            timestamp: now(),
        };
        let (mut message, toggle) = self
            .store
            .toggle_reaction(discussion_id, message_id, reaction, deadline)
            .await?;
        tracing::debug!(?toggle, reactions = message.reactions.len(), "reaction toggled");

        message.author = self.profile(&message.user, deadline).await;
        Ok(message)
    }

    #[tracing::instrument(skip(self, deadline))]
    pub async fn delete_message(
        &self,
        discussion_id: Uuid,
        message_id: Uuid,
        actor: &str,
        deadline: Deadline,
    ) -> DiscussionResult<()> {
        let header = self.header(discussion_id, deadline).await?;
        let message = with_retry(&self.read_retry, deadline, move || {
            self.store.message(discussion_id, message_id, deadline)
        })
        .await?
        .ok_or_else(|| DiscussionError::not_found("Message not found"))?;

        let course = self.course(&header.course_id, deadline).await?;
        guard::require_moderator(&course, actor, &message)?;

        self.store
            .delete_message(discussion_id, message_id, now(), deadline)
            .await?;
        tracing::info!(%message_id, "message deleted");
        Ok(())
    }

    /// Teacher-only: pinned discussions sort above everything else
    #[tracing::instrument(skip(self, deadline))]
    pub async fn set_pinned(
        &self,
        discussion_id: Uuid,
        actor: &str,
        pinned: bool,
        deadline: Deadline,
    ) -> DiscussionResult<Discussion> {
        let header = self.header(discussion_id, deadline).await?;
        let course = self.course(&header.course_id, deadline).await?;
        guard::require_teacher(&course, actor)?;

        self.store
            .set_pinned(discussion_id, pinned, now(), deadline)
            .await?;
        tracing::info!(pinned, "discussion pin updated");

        self.get_discussion(discussion_id, None, deadline).await
    }

    async fn header(
        &self,
        discussion_id: Uuid,
        deadline: Deadline,
    ) -> DiscussionResult<DiscussionHeader> {
        with_retry(&self.read_retry, deadline, move || {
            self.store.header(discussion_id, deadline)
        })
        .await?
        .ok_or_else(|| DiscussionError::not_found("Discussion not found"))
    }

    async fn course(&self, course_id: &str, deadline: Deadline) -> DiscussionResult<Course> {
        deadline
            .run(self.courses.get(course_id))
            .await?
            .ok_or_else(|| DiscussionError::not_found("Course not found"))
    }

    /// Presence on read is bookkeeping: only course members are recorded,
    /// and a failed touch never fails the read itself.
    async fn record_presence(&self, discussion: &mut Discussion, viewer: &str, deadline: Deadline) {
        let course = match self.course(&discussion.course_id, deadline).await {
            Ok(course) => course,
            Err(err) => {
                tracing::warn!(error = %err, "skipping presence update");
                return;
            }
        };
        if !guard::can_participate(&course, viewer) {
            return;
        }
        if let Err(err) = self.presence.touch(discussion, viewer, deadline).await {
            tracing::warn!(error = %err, viewer, "presence update failed");
        }
    }

    async fn profile(&self, user_id: &str, deadline: Deadline) -> Option<UserProfile> {
        match deadline.run(self.users.get(user_id)).await {
            Ok(profile) => profile,
            Err(err) => {
                tracing::warn!(error = %err, user_id, "author lookup failed");
                None
            }
        }
    }

    async fn profile_cached(
        &self,
        user_id: &str,
        seen: &mut HashMap<String, Option<UserProfile>>,
        deadline: Deadline,
    ) -> Option<UserProfile> {
        if let Some(profile) = seen.get(user_id) {
            return profile.clone();
        }
        let profile = self.profile(user_id, deadline).await;
        seen.insert(user_id.to_string(), profile.clone());
        profile
    }

    async fn populate_discussion(&self, discussion: &mut Discussion, deadline: Deadline) {
        let mut profiles = HashMap::new();
        discussion.creator = self
            .profile_cached(&discussion.created_by, &mut profiles, deadline)
            .await;
        for message in &mut discussion.messages {
            message.author = self
                .profile_cached(&message.user, &mut profiles, deadline)
                .await;
        }
    }
}
