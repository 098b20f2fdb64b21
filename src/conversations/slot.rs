//! Durable key-value slot holding the serialized conversation snapshot.
//!
//! A slot is bound to one fixed key at construction; the store only ever
//! reads, overwrites or clears that single value.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use rusqlite::OptionalExtension;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio_rusqlite::Connection;

use crate::conversations::config::{StorageBackend, StorageConfig};
use crate::conversations::errors::{ConversationError, ConversationResult};

/// Boxed future type for slot operations.
pub type SlotFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Durable storage for one snapshot value.
pub trait DurableSlot: Send + Sync {
    /// Read the stored value, `None` if nothing was ever written.
    ///
    /// # Errors
    /// Returns an error if the medium cannot be read.
    fn read(&self) -> SlotFuture<'_, ConversationResult<Option<String>>>;

    /// Overwrite the stored value in full.
    ///
    /// # Errors
    /// Returns an error if the medium rejects the write.
    fn write(&self, value: String) -> SlotFuture<'_, ConversationResult<()>>;

    /// Remove the stored value.
    ///
    /// # Errors
    /// Returns an error if the medium cannot be updated.
    fn clear(&self) -> SlotFuture<'_, ConversationResult<()>>;
}

/// Open the slot described by `config`.
///
/// # Errors
/// Returns an error if the `SQLite` database cannot be opened.
pub async fn open_slot(config: &StorageConfig) -> ConversationResult<Arc<dyn DurableSlot>> {
    let slot: Arc<dyn DurableSlot> = match config.backend {
        StorageBackend::Memory => Arc::new(MemorySlot::new()),
        StorageBackend::File => Arc::new(FileSlot::new(&config.path, &config.key)),
        StorageBackend::Sqlite => Arc::new(SqliteSlot::open(&config.path, &config.key).await?),
    };
    Ok(slot)
}

/// In-process slot, used as a test double and for throwaway sessions.
#[derive(Debug, Default)]
pub struct MemorySlot {
    value: Mutex<Option<String>>,
    capacity: Option<usize>,
    unavailable: AtomicBool,
}

impl MemorySlot {
    /// Create an empty slot without a quota.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a slot that already holds `value`.
    #[must_use]
    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            value: Mutex::new(Some(value.into())),
            ..Self::default()
        }
    }

    /// Limit stored values to `bytes`, like a browser storage quota.
    #[must_use]
    pub const fn with_capacity(mut self, bytes: usize) -> Self {
        self.capacity = Some(bytes);
        self
    }

    /// Make every subsequent operation fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Current raw value.
    pub async fn snapshot(&self) -> Option<String> {
        self.value.lock().await.clone()
    }

    fn ensure_available(&self) -> ConversationResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ConversationError::Unavailable(
                "memory slot switched off".to_string(),
            ));
        }
        Ok(())
    }
}

impl DurableSlot for MemorySlot {
    fn read(&self) -> SlotFuture<'_, ConversationResult<Option<String>>> {
        Box::pin(async move {
            self.ensure_available()?;
            Ok(self.value.lock().await.clone())
        })
    }

    fn write(&self, value: String) -> SlotFuture<'_, ConversationResult<()>> {
        Box::pin(async move {
            self.ensure_available()?;
            if let Some(capacity) = self.capacity {
                if value.len() > capacity {
                    return Err(ConversationError::CapacityExceeded {
                        needed: value.len(),
                        capacity,
                    });
                }
            }
            *self.value.lock().await = Some(value);
            Ok(())
        })
    }

    fn clear(&self) -> SlotFuture<'_, ConversationResult<()>> {
        Box::pin(async move {
            self.ensure_available()?;
            *self.value.lock().await = None;
            Ok(())
        })
    }
}

/// JSON file slot stored as `<dir>/<key>.json`.
#[derive(Clone, Debug)]
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    /// Bind the slot for `key` inside `dir`.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>, key: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{key}.json")),
        }
    }

    /// Location of the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl DurableSlot for FileSlot {
    fn read(&self) -> SlotFuture<'_, ConversationResult<Option<String>>> {
        Box::pin(async move {
            match tokio::fs::read_to_string(&self.path).await {
                Ok(value) => Ok(Some(value)),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(err) => Err(err.into()),
            }
        })
    }

    fn write(&self, value: String) -> SlotFuture<'_, ConversationResult<()>> {
        Box::pin(async move {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            // Write next to the target, then rename so readers never see half a snapshot.
            let temp = self.temp_path();
            if let Err(err) = replace_with(&temp, &self.path, value.as_bytes()).await {
                let _ = tokio::fs::remove_file(&temp).await;
                return Err(err.into());
            }
            Ok(())
        })
    }

    fn clear(&self) -> SlotFuture<'_, ConversationResult<()>> {
        Box::pin(async move {
            match tokio::fs::remove_file(&self.path).await {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(err.into()),
            }
        })
    }
}

/// Write `bytes` to `temp`, flush it to disk, then move it over `target`.
async fn replace_with(temp: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(temp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(temp, target).await
}

/// `SQLite` key-value slot.
pub struct SqliteSlot {
    conn: Connection,
    table: String,
    key: String,
}

impl SqliteSlot {
    /// Table name for slots.
    pub const DEFAULT_TABLE: &'static str = "slots";

    /// Open (or create) the database at `path` and bind the slot for `key`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or the table created.
    pub async fn open(path: impl AsRef<Path>, key: &str) -> ConversationResult<Self> {
        let conn = Connection::open(path.as_ref()).await?;
        Self::with_connection(conn, key).await
    }

    /// Slot backed by a private in-memory database.
    ///
    /// # Errors
    /// Returns an error if the table cannot be created.
    pub async fn open_in_memory(key: &str) -> ConversationResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::with_connection(conn, key).await
    }

    async fn with_connection(conn: Connection, key: &str) -> ConversationResult<Self> {
        let table = Self::DEFAULT_TABLE.to_string();
        let table_name = table.clone();

        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                );"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self {
            conn,
            table,
            key: key.to_string(),
        })
    }
}

impl DurableSlot for SqliteSlot {
    fn read(&self) -> SlotFuture<'_, ConversationResult<Option<String>>> {
        Box::pin(async move {
            let table = self.table.clone();
            let key = self.key.clone();
            let value = self
                .conn
                .call(move |conn| {
                    let value = conn
                        .query_row(
                            &format!("SELECT value FROM {table} WHERE key = ?1"),
                            rusqlite::params![key],
                            |row| row.get::<_, String>(0),
                        )
                        .optional()?;
                    Ok(value)
                })
                .await?;
            Ok(value)
        })
    }

    fn write(&self, value: String) -> SlotFuture<'_, ConversationResult<()>> {
        Box::pin(async move {
            let table = self.table.clone();
            let key = self.key.clone();
            let now_ms = Utc::now().timestamp_millis();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!(
                            "INSERT INTO {table} (key, value, updated_at) VALUES (?1, ?2, ?3)
                             ON CONFLICT(key) DO UPDATE
                             SET value = excluded.value, updated_at = excluded.updated_at"
                        ),
                        rusqlite::params![key, value, now_ms],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }

    fn clear(&self) -> SlotFuture<'_, ConversationResult<()>> {
        Box::pin(async move {
            let table = self.table.clone();
            let key = self.key.clone();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!("DELETE FROM {table} WHERE key = ?1"),
                        rusqlite::params![key],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("sales-assistant-slot-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_memory_slot_round_trip() {
        let slot = MemorySlot::new();
        assert_eq!(slot.read().await.unwrap(), None);
        slot.write("[]".to_string()).await.unwrap();
        assert_eq!(slot.read().await.unwrap().as_deref(), Some("[]"));
        slot.clear().await.unwrap();
        assert_eq!(slot.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_slot_quota_keeps_previous_value() {
        let slot = MemorySlot::with_value("old").with_capacity(4);
        let err = slot.write("too long".to_string()).await.unwrap_err();
        assert!(matches!(
            err,
            ConversationError::CapacityExceeded {
                needed: 8,
                capacity: 4
            }
        ));
        assert_eq!(slot.snapshot().await.as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn test_memory_slot_unavailable() {
        let slot = MemorySlot::new();
        slot.set_unavailable(true);
        assert!(slot.read().await.is_err());
        assert!(slot.write("[]".to_string()).await.is_err());
        slot.set_unavailable(false);
        assert!(slot.write("[]".to_string()).await.is_ok());
    }

    #[tokio::test]
    async fn test_file_slot_overwrite_and_clear() {
        let dir = scratch_dir();
        let slot = FileSlot::new(&dir, "conversations");
        assert_eq!(slot.read().await.unwrap(), None);

        slot.write("[1]".to_string()).await.unwrap();
        slot.write("[2]".to_string()).await.unwrap();
        assert_eq!(slot.read().await.unwrap().as_deref(), Some("[2]"));
        assert!(slot.path().ends_with("conversations.json"));

        slot.clear().await.unwrap();
        assert_eq!(slot.read().await.unwrap(), None);
        slot.clear().await.unwrap();

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_file_slot_failed_rename_keeps_no_temp_file() {
        let dir = scratch_dir();
        let slot = FileSlot::new(&dir, "blocked");
        std::fs::create_dir_all(dir.join("blocked.json").join("occupied")).unwrap();

        assert!(slot.write("[1]".to_string()).await.is_err());
        assert!(!dir.join("blocked.json.tmp").exists());
        assert!(slot.path().is_dir());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_sqlite_slot_upsert_and_clear() {
        let slot = SqliteSlot::open_in_memory("conversations").await.unwrap();
        assert_eq!(slot.read().await.unwrap(), None);

        slot.write("[1]".to_string()).await.unwrap();
        slot.write("[2]".to_string()).await.unwrap();
        assert_eq!(slot.read().await.unwrap().as_deref(), Some("[2]"));

        slot.clear().await.unwrap();
        assert_eq!(slot.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_open_slot_follows_backend() {
        let dir = scratch_dir();
        let config = StorageConfig {
            backend: StorageBackend::File,
            path: dir.clone(),
            key: "opened".to_string(),
        };
        let slot = open_slot(&config).await.unwrap();
        slot.write("[]".to_string()).await.unwrap();
        assert!(dir.join("opened.json").exists());

        let memory = open_slot(&StorageConfig {
            backend: StorageBackend::Memory,
            ..StorageConfig::default()
        })
        .await
        .unwrap();
        assert_eq!(memory.read().await.unwrap(), None);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_sqlite_slots_are_keyed() {
        let dir = scratch_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("slots.db");

        let first = SqliteSlot::open(&path, "first").await.unwrap();
        first.write("a".to_string()).await.unwrap();
        let second = SqliteSlot::open(&path, "second").await.unwrap();
        assert_eq!(second.read().await.unwrap(), None);
        assert_eq!(first.read().await.unwrap().as_deref(), Some("a"));

        let _ = std::fs::remove_dir_all(dir);
    }
}
