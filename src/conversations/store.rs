//! In-memory conversation collection synchronized to a durable slot.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::conversations::clock::Clock;
use crate::conversations::config::TitleConfig;
use crate::conversations::errors::{ConversationError, ConversationResult};
use crate::conversations::ids::ConversationId;
use crate::conversations::slot::DurableSlot;
use crate::conversations::types::{Conversation, Message, Role, derive_title};

/// What happened when the snapshot was loaded.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LoadOutcome {
    /// Nothing had been stored yet.
    Missing,
    /// Snapshot adopted with this many conversations.
    Loaded(usize),
    /// Snapshot present but unusable; the store started empty.
    Corrupt(String),
    /// The medium could not be read; the store started empty.
    Unavailable(String),
}

/// Result of writing the snapshot after a mutation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PersistOutcome {
    /// Full snapshot written.
    Written {
        /// Size of the serialized snapshot.
        bytes: usize,
    },
    /// Collection became empty and the slot was cleared.
    Cleared,
    /// Write failed; memory stays authoritative for this session.
    Failed(String),
}

impl PersistOutcome {
    /// Whether the snapshot reached the medium.
    #[must_use]
    pub const fn is_durable(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// A mutation that succeeded in memory, with the outcome of persisting it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Committed<T> {
    /// Value produced by the operation.
    pub value: T,
    /// Persistence outcome, reported as a warning when it failed.
    pub persistence: PersistOutcome,
}

/// Owner of all conversations and of the current selection.
pub struct ConversationStore {
    titles: TitleConfig,
    slot: Arc<dyn DurableSlot>,
    clock: Arc<dyn Clock>,
    conversations: Vec<Conversation>,
    current: Option<ConversationId>,
    load_outcome: LoadOutcome,
}

impl ConversationStore {
    /// Load the persisted snapshot and build the store.
    ///
    /// Never fails: an unreadable or corrupt snapshot yields an empty store
    /// and is reported through [`Self::load_outcome`]. Nothing is written back.
    pub async fn initialize(
        slot: Arc<dyn DurableSlot>,
        clock: Arc<dyn Clock>,
        titles: TitleConfig,
    ) -> Self {
        let (conversations, load_outcome) = match slot.read().await {
            Ok(None) => (Vec::new(), LoadOutcome::Missing),
            Ok(Some(raw)) => match parse_snapshot(&raw) {
                Ok(conversations) => {
                    let count = conversations.len();
                    (conversations, LoadOutcome::Loaded(count))
                }
                Err(err) => {
                    warn!("Failed to parse conversations snapshot: {err}");
                    (Vec::new(), LoadOutcome::Corrupt(err.to_string()))
                }
            },
            Err(err) => {
                warn!("Failed to read conversations snapshot: {err}");
                (Vec::new(), LoadOutcome::Unavailable(err.to_string()))
            }
        };

        let current = conversations.first().map(|c| c.id().clone());
        info!(
            conversations = conversations.len(),
            "Conversation store ready: {load_outcome:?}"
        );

        Self {
            titles,
            slot,
            clock,
            conversations,
            current,
            load_outcome,
        }
    }

    /// Outcome of the initial load.
    #[must_use]
    pub const fn load_outcome(&self) -> &LoadOutcome {
        &self.load_outcome
    }

    /// Conversations, most recently created first.
    #[must_use]
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// Identifier of the selected conversation.
    #[must_use]
    pub const fn current_conversation_id(&self) -> Option<&ConversationId> {
        self.current.as_ref()
    }

    /// The selected conversation, if any.
    #[must_use]
    pub fn current_conversation(&self) -> Option<&Conversation> {
        self.current.as_ref().and_then(|id| self.get(id))
    }

    /// Look up a conversation by id.
    #[must_use]
    pub fn get(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id() == id)
    }

    /// Conversations whose title or messages contain `query`, case-insensitively.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<&Conversation> {
        self.conversations
            .iter()
            .filter(|c| c.matches(query))
            .collect()
    }

    /// Build a message stamped with the store's clock.
    #[must_use]
    pub fn compose(&self, role: Role, content: impl Into<String>) -> Message {
        Message::new(role, content, self.clock.now())
    }

    /// Create an empty conversation, put it first and select it.
    pub async fn create_conversation(&mut self) -> Committed<ConversationId> {
        let mut id = ConversationId::new();
        while self.get(&id).is_some() {
            id = ConversationId::new();
        }

        let conversation = Conversation::new(
            id.clone(),
            self.titles.default_title.clone(),
            self.clock.now(),
        );
        self.conversations.insert(0, conversation);
        self.current = Some(id.clone());
        info!("Created new conversation: {id}");

        let persistence = self.persist().await;
        Committed {
            value: id,
            persistence,
        }
    }

    /// Remove a conversation.
    ///
    /// When the removed conversation was selected, the first remaining one
    /// becomes current (or nothing when the collection is now empty).
    ///
    /// # Errors
    /// Returns `NotFound` and changes nothing if `id` is unknown.
    pub async fn delete_conversation(
        &mut self,
        id: &ConversationId,
    ) -> ConversationResult<Committed<()>> {
        let index = self.index_of(id)?;
        self.conversations.remove(index);

        if self.current.as_ref() == Some(id) {
            self.current = self.conversations.first().map(|c| c.id().clone());
        }
        info!("Deleted conversation: {id}");

        let persistence = self.persist().await;
        Ok(Committed {
            value: (),
            persistence,
        })
    }

    /// Rename a conversation to the trimmed `title`.
    ///
    /// # Errors
    /// Returns `InvalidTitle` for a blank title and `NotFound` for an unknown id;
    /// the previous title is kept in both cases.
    pub async fn update_conversation_title(
        &mut self,
        id: &ConversationId,
        title: &str,
    ) -> ConversationResult<Committed<()>> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ConversationError::InvalidTitle(
                "title must not be empty".to_string(),
            ));
        }
        let index = self.index_of(id)?;

        let now = self.clock.now();
        self.conversations[index].set_title(title.to_string(), now);
        debug!("Renamed conversation {id} to: {title}");

        let persistence = self.persist().await;
        Ok(Committed {
            value: (),
            persistence,
        })
    }

    /// Append `message` to a conversation.
    ///
    /// The first message of a conversation, when user-authored, also sets
    /// the title from its content.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown id and `InvalidMessage` for a blank
    /// user message or a message id already present; nothing changes then.
    pub async fn add_message(
        &mut self,
        id: &ConversationId,
        message: Message,
    ) -> ConversationResult<Committed<()>> {
        if message.role == Role::User && message.content.trim().is_empty() {
            return Err(ConversationError::InvalidMessage(
                "user message must not be empty".to_string(),
            ));
        }
        let index = self.index_of(id)?;
        let now = self.clock.now();
        let titles = &self.titles;
        let conversation = &mut self.conversations[index];

        if conversation.contains_message(&message.id) {
            return Err(ConversationError::InvalidMessage(format!(
                "message {} already in conversation {id}",
                message.id
            )));
        }

        if conversation.is_empty() && message.role == Role::User {
            let title = derive_title(&message.content, titles.max_chars, &titles.ellipsis);
            conversation.set_title(title, now);
        }
        debug!(role = %message.role, "Appending message to conversation {id}");
        conversation.push(message, now);

        let persistence = self.persist().await;
        Ok(Committed {
            value: (),
            persistence,
        })
    }

    /// Select a conversation.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown id; the previous selection is kept.
    pub fn select_conversation(&mut self, id: &ConversationId) -> ConversationResult<()> {
        self.index_of(id)?;
        self.current = Some(id.clone());
        debug!("Switched to conversation: {id}");
        Ok(())
    }

    fn index_of(&self, id: &ConversationId) -> ConversationResult<usize> {
        self.conversations
            .iter()
            .position(|c| c.id() == id)
            .ok_or_else(|| ConversationError::NotFound(id.clone()))
    }

    /// Write the full collection, or clear the slot once it is empty.
    async fn persist(&self) -> PersistOutcome {
        if self.conversations.is_empty() {
            return match self.slot.clear().await {
                Ok(()) => PersistOutcome::Cleared,
                Err(err) => {
                    warn!("Failed to clear conversations snapshot: {err}");
                    PersistOutcome::Failed(err.to_string())
                }
            };
        }

        let raw = match serde_json::to_string(&self.conversations) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("Failed to serialize conversations: {err}");
                return PersistOutcome::Failed(err.to_string());
            }
        };
        let bytes = raw.len();
        match self.slot.write(raw).await {
            Ok(()) => PersistOutcome::Written { bytes },
            Err(err) => {
                warn!("Failed to persist conversations: {err}");
                PersistOutcome::Failed(err.to_string())
            }
        }
    }
}

/// Parse a snapshot and check the collection invariants.
fn parse_snapshot(raw: &str) -> ConversationResult<Vec<Conversation>> {
    let conversations: Vec<Conversation> = serde_json::from_str(raw)?;
    let mut seen = HashSet::with_capacity(conversations.len());
    for conversation in &conversations {
        if !seen.insert(conversation.id()) {
            return Err(ConversationError::CorruptSnapshot(format!(
                "duplicate conversation id {}",
                conversation.id()
            )));
        }
        conversation
            .check_invariants()
            .map_err(ConversationError::CorruptSnapshot)?;
    }
    Ok(conversations)
}
