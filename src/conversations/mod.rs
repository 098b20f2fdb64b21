//! Conversation store for the sales assistant.
//!
//! This module owns everything that outlives a single render:
//! - `types`: conversations, messages and title derivation
//! - `ids`: identifier newtypes
//! - `store`: the collection, current selection and persistence policy
//! - `slot`: durable storage backends for the snapshot
//! - `clock`: injected time source
//! - `responder` / `chat`: the stubbed assistant and the send flow
//! - `config` / `errors`: settings and error types

pub mod chat;
pub mod clock;
pub mod config;
pub mod errors;
pub mod ids;
pub mod responder;
pub mod slot;
pub mod store;
pub mod types;

pub use chat::{ChatTurn, send_message};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ReplyConfig, StorageBackend, StorageConfig, StoreConfig, TitleConfig};
pub use errors::{ConversationError, ConversationResult};
pub use ids::{ConversationId, EmptyIdError, MessageId};
pub use responder::{Responder, StubResponder};
pub use slot::{DurableSlot, FileSlot, MemorySlot, SqliteSlot, open_slot};
pub use store::{Committed, ConversationStore, LoadOutcome, PersistOutcome};
pub use types::{Conversation, Message, Role, derive_title};
