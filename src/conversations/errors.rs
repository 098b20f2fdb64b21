//! Error types for the conversation store.

use thiserror::Error;

use crate::conversations::ids::ConversationId;

/// Conversation store error type.
#[derive(Debug, Error)]
pub enum ConversationError {
    /// No conversation with the given id exists.
    #[error("conversation not found: {0}")]
    NotFound(ConversationId),
    /// Rejected title (empty or whitespace-only).
    #[error("invalid title: {0}")]
    InvalidTitle(String),
    /// Rejected message (blank user content, duplicate id).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Snapshot parsed but breaks a collection invariant.
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),
    /// Durable medium refused the write because of its quota.
    #[error("storage capacity exceeded: needed {needed} bytes, capacity {capacity} bytes")]
    CapacityExceeded {
        /// Size of the rejected value.
        needed: usize,
        /// Configured capacity of the slot.
        capacity: usize,
    },
    /// Durable medium is not reachable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// `SQLite` storage error (sync).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// `SQLite` storage error (async).
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConversationError {
    /// Whether the error was raised by the durable medium rather than by a caller mistake.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::CapacityExceeded { .. }
                | Self::Unavailable(_)
                | Self::Sqlite(_)
                | Self::TokioSqlite(_)
                | Self::Io(_)
        )
    }
}

/// Convenience result alias for conversation operations.
pub type ConversationResult<T> = Result<T, ConversationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_classification() {
        assert!(ConversationError::Unavailable("offline".to_string()).is_storage());
        assert!(
            ConversationError::CapacityExceeded {
                needed: 10,
                capacity: 5
            }
            .is_storage()
        );
        assert!(!ConversationError::InvalidTitle("   ".to_string()).is_storage());
        assert!(!ConversationError::NotFound(ConversationId::new()).is_storage());
    }

    #[test]
    fn test_display_messages() {
        let err = ConversationError::CapacityExceeded {
            needed: 12,
            capacity: 8,
        };
        assert_eq!(
            err.to_string(),
            "storage capacity exceeded: needed 12 bytes, capacity 8 bytes"
        );
    }
}
