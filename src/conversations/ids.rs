//! Identifier types for conversations and their messages.
//!
//! Both identifiers are opaque, non-empty strings. Fresh ids are UUIDs, but
//! any non-empty text read back from a snapshot is accepted, including the
//! millisecond-timestamp ids earlier clients wrote under the same key.
//!
//! ## Cargo features used by this module
//! - `uuid_v7`: new message ids use `UUIDv7`, which sorts by creation time.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Generate an ID that follows creation order when `uuid_v7` is enabled.
///
/// Without the feature this falls back to `Uuid::new_v4()`.
#[inline]
#[must_use]
fn uuid_time_ordered() -> Uuid {
    #[cfg(feature = "uuid_v7")]
    {
        Uuid::now_v7()
    }
    #[cfg(not(feature = "uuid_v7"))]
    {
        Uuid::new_v4()
    }
}

/// Generate a random UUID (v4).
#[inline]
#[must_use]
fn uuid_random() -> Uuid {
    Uuid::new_v4()
}

/// An identifier that was empty or only whitespace.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
#[error("identifier must not be empty")]
pub struct EmptyIdError;

/// Declare a string identifier newtype with a consistent API.
macro_rules! define_text_id {
    (
        $(#[$meta:meta])*
        $name:ident,
        generator = $generator:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl Default for $name {
            #[inline]
            fn default() -> Self {
                Self::new()
            }
        }

        impl $name {
            /// Create a new identifier.
            #[inline]
            #[must_use]
            pub fn new() -> Self {
                Self($generator().to_string())
            }

            /// Borrow the identifier text.
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<Uuid> for $name {
            #[inline]
            fn from(value: Uuid) -> Self {
                Self(value.to_string())
            }
        }

        impl TryFrom<String> for $name {
            type Error = EmptyIdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                if value.trim().is_empty() {
                    Err(EmptyIdError)
                } else {
                    Ok(Self(value))
                }
            }
        }

        impl From<$name> for String {
            #[inline]
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = EmptyIdError;

            #[inline]
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::try_from(s.trim().to_string())
            }
        }
    };
}

define_text_id!(
    /// Identifier of a conversation.
    ///
    /// Random (`UUIDv4`) when generated so ids never collide across sessions
    /// sharing a slot.
    ConversationId,
    generator = uuid_random
);

define_text_id!(
    /// Identifier of a single message inside a conversation.
    MessageId,
    generator = uuid_time_ordered
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_distinct() {
        let ids: HashSet<ConversationId> = (0..256).map(|_| ConversationId::new()).collect();
        assert_eq!(ids.len(), 256);
    }

    #[test]
    fn test_parse_display() {
        let id = MessageId::new();
        let parsed: MessageId = format!("  {id} ").parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!("1700000000000".parse::<ConversationId>().unwrap().as_str(), "1700000000000");
        assert_eq!(" ".parse::<ConversationId>(), Err(EmptyIdError));
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = ConversationId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }

    #[test]
    fn test_deserializes_any_non_empty_text() {
        let id: ConversationId = serde_json::from_str("\"1700000000000\"").unwrap();
        assert_eq!(id.to_string(), "1700000000000");
        assert!(serde_json::from_str::<MessageId>("\"\"").is_err());
        assert!(serde_json::from_str::<MessageId>("42").is_err());
    }
}
