//! Conversation and message model.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conversations::ids::{ConversationId, MessageId};

/// Author of a message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// User input.
    User,
    /// Assistant response.
    Assistant,
}

impl Role {
    /// Stable string form for storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(value.to_string()),
        }
    }
}

/// A single turn authored by the user or the assistant.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier within the conversation.
    pub id: MessageId,
    /// Author of the message.
    pub role: Role,
    /// Text payload.
    pub content: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Build a message with a fresh id.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content: content.into(),
            timestamp,
        }
    }

    /// Build a user message.
    #[must_use]
    pub fn user(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(Role::User, content, timestamp)
    }

    /// Build an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(Role::Assistant, content, timestamp)
    }
}

/// A titled, timestamped, append-only sequence of messages.
///
/// Fields are private: the store is the only writer, which keeps the
/// message log append-only and `updated_at` monotonic.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    id: ConversationId,
    title: String,
    messages: Vec<Message>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create an empty conversation stamped at `now`.
    #[must_use]
    pub fn new(id: ConversationId, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: title.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Conversation identifier.
    #[must_use]
    pub const fn id(&self) -> &ConversationId {
        &self.id
    }

    /// Display title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Messages in insertion order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time of the last mutation.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Whether any message has been appended yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Whether a message with `id` is already part of this conversation.
    #[must_use]
    pub fn contains_message(&self, id: &MessageId) -> bool {
        self.messages.iter().any(|message| &message.id == id)
    }

    /// Case-insensitive match against the title or any message content.
    ///
    /// A blank query matches everything.
    #[must_use]
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(&needle)
            || self
                .messages
                .iter()
                .any(|message| message.content.to_lowercase().contains(&needle))
    }

    /// First message content cut to `max_chars` characters, for list snippets.
    #[must_use]
    pub fn preview(&self, max_chars: usize) -> Option<String> {
        self.messages
            .first()
            .map(|message| message.content.chars().take(max_chars).collect())
    }

    pub(crate) fn set_title(&mut self, title: String, now: DateTime<Utc>) {
        self.title = title;
        self.touch(now);
    }

    pub(crate) fn push(&mut self, message: Message, now: DateTime<Utc>) {
        self.messages.push(message);
        self.touch(now);
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        // A clock that stepped backwards must not break updated_at >= created_at.
        self.updated_at = now.max(self.created_at).max(self.updated_at);
    }

    /// Check the per-conversation invariants of a deserialized record.
    pub(crate) fn check_invariants(&self) -> Result<(), String> {
        if self.updated_at < self.created_at {
            return Err(format!(
                "conversation {} updated before it was created",
                self.id
            ));
        }
        let mut seen = HashSet::with_capacity(self.messages.len());
        for message in &self.messages {
            if !seen.insert(&message.id) {
                return Err(format!(
                    "conversation {} repeats message id {}",
                    self.id, message.id
                ));
            }
        }
        Ok(())
    }
}

/// Derive a title from the first user message.
///
/// Keeps the first `max_chars` characters and appends `ellipsis` only when
/// something was cut.
#[must_use]
pub fn derive_title(content: &str, max_chars: usize, ellipsis: &str) -> String {
    match content.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{ellipsis}", &content[..cut]),
        None => content.to_string(),
    }
}
