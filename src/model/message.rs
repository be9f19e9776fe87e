use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::directory::UserProfile;
use crate::error::DiscussionError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Emoji,
    File,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Emoji => "emoji",
            MessageKind::File => "file",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = DiscussionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(MessageKind::Text),
            "emoji" => Ok(MessageKind::Emoji),
            "file" => Ok(MessageKind::File),
            other => Err(DiscussionError::invalid(format!(
                "Invalid message type: {other}"
            ))),
        }
    }
}

/// A (user, emoji) tag on a message. Unique per pair within one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub emoji: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Which branch a reaction toggle took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionToggle {
    Added,
    Removed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub emoji: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    /// Author id
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<UserProfile>,
    pub timestamp: DateTime<Utc>,
    // Reserved: no operation edits messages yet.
    pub edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub reactions: Vec<Reaction>,
}

impl Message {
    pub fn new(input: NewMessage, user: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: input.content,
            kind: input.kind,
            emoji: input.emoji,
            file_url: input.file_url,
            file_name: input.file_name,
            user: user.to_string(),
            author: None,
            timestamp: now,
            edited: false,
            edited_at: None,
            reactions: Vec::new(),
        }
    }

    pub fn has_reaction(&self, user_id: &str, emoji: &str) -> bool {
        self.reactions
            .iter()
            .any(|r| r.user_id == user_id && r.emoji == emoji)
    }
}

/// Input for `addMessage`
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub content: String,
    pub kind: MessageKind,
    pub emoji: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
}

impl NewMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn file(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::File,
            file_url: Some(url.into()),
            file_name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), DiscussionError> {
        match self.kind {
            MessageKind::Text if self.content.trim().is_empty() => {
                Err(DiscussionError::invalid("Message content is required"))
            }
            MessageKind::File if is_blank(&self.file_url) || is_blank(&self.file_name) => Err(
                DiscussionError::invalid("File URL and file name are required for file messages"),
            ),
            _ => Ok(()),
        }
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}
