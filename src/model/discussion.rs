use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::Message;
use crate::directory::UserProfile;
use crate::error::DiscussionError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscussionKind {
    #[default]
    General,
    Question,
    Announcement,
}

impl DiscussionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscussionKind::General => "general",
            DiscussionKind::Question => "question",
            DiscussionKind::Announcement => "announcement",
        }
    }
}

impl fmt::Display for DiscussionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscussionKind {
    type Err = DiscussionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "general" => Ok(DiscussionKind::General),
            "question" => Ok(DiscussionKind::Question),
            "announcement" => Ok(DiscussionKind::Announcement),
            other => Err(DiscussionError::invalid(format!(
                "Invalid discussion type: {other}"
            ))),
        }
    }
}

/// A user who joined, or was auto-joined into, a discussion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: String,
    pub joined_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Participant {
    pub fn joined(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            joined_at: now,
            last_seen: now,
        }
    }
}

/// Aggregate root: the discussion together with its messages, reactions
/// and participants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discussion {
    pub id: Uuid,
    pub course_id: String,
    /// `None` means the discussion is course-wide
    pub lesson_id: Option<String>,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: DiscussionKind,
    pub tags: BTreeSet<String>,
    pub is_active: bool,
    pub is_pinned: bool,
    pub participants: Vec<Participant>,
    pub messages: Vec<Message>,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<UserProfile>,
    pub message_count: usize,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Discussion {
    pub fn new(input: NewDiscussion, created_by: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            course_id: input.course_id,
            lesson_id: input.lesson_id,
            title: input.title.trim().to_string(),
            description: input.description,
            kind: input.kind,
            tags: input.tags,
            is_active: true,
            is_pinned: false,
            participants: vec![Participant::joined(created_by, now)],
            messages: Vec::new(),
            created_by: created_by.to_string(),
            creator: None,
            message_count: 0,
            last_activity: now,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn message(&self, message_id: Uuid) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }
}

/// Listing row: the discussion header without its message history
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscussionSummary {
    pub id: Uuid,
    pub course_id: String,
    pub lesson_id: Option<String>,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: DiscussionKind,
    pub tags: BTreeSet<String>,
    pub is_active: bool,
    pub is_pinned: bool,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<UserProfile>,
    pub message_count: usize,
    pub participant_count: usize,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for `createDiscussion`
#[derive(Debug, Clone, Default)]
pub struct NewDiscussion {
    pub course_id: String,
    pub title: String,
    pub description: String,
    pub kind: DiscussionKind,
    pub lesson_id: Option<String>,
    pub tags: BTreeSet<String>,
}

impl NewDiscussion {
    pub fn new(course_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            course_id: course_id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn kind(mut self, kind: DiscussionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn lesson(mut self, lesson_id: impl Into<String>) -> Self {
        self.lesson_id = Some(lesson_id.into());
        self
    }

    /// Tags are trimmed and deduplicated; blank tags are dropped
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = tags
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        self
    }

    pub fn validate(&self) -> Result<(), DiscussionError> {
        if self.course_id.trim().is_empty() {
            return Err(DiscussionError::invalid("Course ID is required"));
        }
        if self.title.trim().is_empty() {
            return Err(DiscussionError::invalid("Title is required"));
        }
        Ok(())
    }
}

/// Optional filters for `DiscussionService::list_discussions`
#[derive(Debug, Clone, Default)]
pub struct DiscussionFilter {
    pub lesson_id: Option<String>,
    pub kind: Option<DiscussionKind>,
}
