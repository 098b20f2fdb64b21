//! Configuration for the conversation store and its collaborators.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::conversations::errors::{ConversationError, ConversationResult};

/// Prefix of every environment variable read by [`StoreConfig::from_env`].
pub const ENV_PREFIX: &str = "SALES_ASSISTANT_";

/// Default key of the durable slot.
pub const DEFAULT_STORAGE_KEY: &str = "ai-sales-assistant-conversations";

/// Where the snapshot lives.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Process memory only; nothing survives a restart.
    Memory,
    /// One JSON file per key.
    File,
    /// Key-value table in a `SQLite` database.
    Sqlite,
}

impl StorageBackend {
    /// Stable string form for configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File => "file",
            Self::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageBackend {
    type Err = ConversationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(ConversationError::InvalidConfig(format!(
                "unknown storage backend {other:?}"
            ))),
        }
    }
}

/// Storage settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend kind.
    pub backend: StorageBackend,
    /// Database file (`sqlite`) or directory (`file`); unused for `memory`.
    pub path: PathBuf,
    /// Fixed key of the durable slot.
    pub key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            path: PathBuf::from("sales_assistant.db"),
            key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

/// Title settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TitleConfig {
    /// Title of a conversation before its first user message.
    pub default_title: String,
    /// Characters kept when deriving a title from the first user message.
    pub max_chars: usize,
    /// Marker appended when the derived title was cut.
    pub ellipsis: String,
}

impl Default for TitleConfig {
    fn default() -> Self {
        Self {
            default_title: "New Conversation".to_string(),
            max_chars: 50,
            ellipsis: "...".to_string(),
        }
    }
}

/// Stub assistant settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplyConfig {
    /// Simulated latency before the reply arrives.
    pub delay_ms: u64,
    /// Fixed reply text.
    pub content: String,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            delay_ms: 1000,
            content: "I'll help you with that. Let me process your request...".to_string(),
        }
    }
}

impl ReplyConfig {
    /// Simulated latency as a `Duration`.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Storage settings.
    pub storage: StorageConfig,
    /// Title settings.
    pub titles: TitleConfig,
    /// Stub assistant settings.
    pub reply: ReplyConfig,
}

impl StoreConfig {
    /// Create a config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the storage backend.
    #[must_use]
    pub const fn with_backend(mut self, backend: StorageBackend) -> Self {
        self.storage.backend = backend;
        self
    }

    /// Set the storage path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage.path = path.into();
        self
    }

    /// Set the slot key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.storage.key = key.into();
        self
    }

    /// Set the stub reply delay.
    #[must_use]
    pub const fn with_reply_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reply.delay_ms = delay_ms;
        self
    }

    /// Load from the process environment (`SALES_ASSISTANT_*`).
    ///
    /// # Errors
    /// Returns an error if a variable holds an invalid value.
    pub fn from_env() -> ConversationResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` to resolve variable names.
    ///
    /// # Errors
    /// Returns an error if a variable holds an invalid value.
    pub fn from_lookup<F>(lookup: F) -> ConversationResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            lookup(&format!("{ENV_PREFIX}{suffix}"))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();

        if let Some(backend) = var("STORAGE") {
            config.storage.backend = backend.parse()?;
            if config.storage.backend == StorageBackend::File {
                config.storage.path = PathBuf::from(".");
            }
        }
        if let Some(path) = var("DATA_PATH") {
            config.storage.path = PathBuf::from(path);
        }
        if let Some(key) = var("STORAGE_KEY") {
            config.storage.key = key;
        }
        if let Some(delay) = var("REPLY_DELAY_MS") {
            config.reply.delay_ms = delay.parse().map_err(|err| {
                ConversationError::InvalidConfig(format!("REPLY_DELAY_MS {delay:?}: {err}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> ConversationResult<()> {
        if self.storage.key.trim().is_empty() {
            return Err(ConversationError::InvalidConfig(
                "storage.key must not be empty".to_string(),
            ));
        }

        if self.storage.key.contains(['/', '\\']) {
            return Err(ConversationError::InvalidConfig(
                "storage.key must not contain path separators".to_string(),
            ));
        }

        if self.titles.default_title.trim().is_empty() {
            return Err(ConversationError::InvalidConfig(
                "titles.default_title must not be empty".to_string(),
            ));
        }

        if self.titles.max_chars == 0 {
            return Err(ConversationError::InvalidConfig(
                "titles.max_chars must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_config_default() {
        let config = StoreConfig::default();
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.storage.key, DEFAULT_STORAGE_KEY);
        assert_eq!(config.titles.default_title, "New Conversation");
        assert_eq!(config.titles.max_chars, 50);
        assert_eq!(config.reply.delay(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_lookup() {
        let config = StoreConfig::from_lookup(lookup_from(&[
            ("SALES_ASSISTANT_STORAGE", "file"),
            ("SALES_ASSISTANT_DATA_PATH", "/tmp/sales"),
            ("SALES_ASSISTANT_STORAGE_KEY", "custom"),
            ("SALES_ASSISTANT_REPLY_DELAY_MS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.storage.backend, StorageBackend::File);
        assert_eq!(config.storage.path, PathBuf::from("/tmp/sales"));
        assert_eq!(config.storage.key, "custom");
        assert_eq!(config.reply.delay_ms, 5);
    }

    #[test]
    fn test_config_from_lookup_rejects_bad_values() {
        assert!(
            StoreConfig::from_lookup(lookup_from(&[("SALES_ASSISTANT_STORAGE", "redis")]))
                .is_err()
        );
        assert!(
            StoreConfig::from_lookup(lookup_from(&[(
                "SALES_ASSISTANT_REPLY_DELAY_MS",
                "soon"
            )]))
            .is_err()
        );
    }

    #[test]
    fn test_config_builder() {
        let config = StoreConfig::new()
            .with_backend(StorageBackend::Memory)
            .with_key("k")
            .with_path("data")
            .with_reply_delay_ms(0);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.key, "k");
        assert_eq!(config.reply.delay_ms, 0);
    }

    #[test]
    fn test_validate_rejects_bad_key_and_title() {
        assert!(StoreConfig::new().with_key("  ").validate().is_err());
        assert!(StoreConfig::new().with_key("a/b").validate().is_err());

        let mut config = StoreConfig::new();
        config.titles.max_chars = 0;
        assert!(config.validate().is_err());
    }
}
