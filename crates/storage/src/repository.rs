use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A stored payload and when it was last written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveSlot {
    pub key: String,
    pub payload: String,
    pub updated_at: DateTime<Utc>,
}

/// Durable key-value storage for serialized learner records.
///
/// Payloads are opaque text; validation happens in the layer above.
#[async_trait]
pub trait SaveSlotRepository: Send + Sync {
    /// Fetch the slot stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read. A missing slot is
    /// `Ok(None)`, not an error.
    async fn read_slot(&self, key: &str) -> Result<Option<SaveSlot>, StorageError>;

    /// Create or replace the slot stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the payload cannot be written.
    async fn write_slot(
        &self,
        key: &str,
        payload: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Delete the slot stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no slot exists, or other storage errors.
    async fn remove_slot(&self, key: &str) -> Result<(), StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    slots: Arc<Mutex<HashMap<String, SaveSlot>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of stored slots.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn len(&self) -> Result<usize, StorageError> {
        let guard = self
            .slots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.len())
    }

    /// True when no slot is stored.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl SaveSlotRepository for InMemoryRepository {
    async fn read_slot(&self, key: &str) -> Result<Option<SaveSlot>, StorageError> {
        let guard = self
            .slots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(key).cloned())
    }

    async fn write_slot(
        &self,
        key: &str,
        payload: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .slots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(
            key.to_owned(),
            SaveSlot {
                key: key.to_owned(),
                payload: payload.to_owned(),
                updated_at: at,
            },
        );
        Ok(())
    }

    async fn remove_slot(&self, key: &str) -> Result<(), StorageError> {
        let mut guard = self
            .slots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(key).map(|_| ()).ok_or(StorageError::NotFound)
    }
}

/// Save-slot backend behind a trait object for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub slots: Arc<dyn SaveSlotRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let slots: Arc<dyn SaveSlotRepository> = Arc::new(InMemoryRepository::new());
        Self { slots }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::time::fixed_now;

    #[tokio::test]
    async fn missing_slot_reads_as_none() {
        let repo = InMemoryRepository::new();
        assert_eq!(repo.read_slot("save").await.unwrap(), None);
    }

    #[tokio::test]
    async fn write_replaces_previous_payload() {
        let repo = InMemoryRepository::new();
        let later = fixed_now() + chrono::Duration::seconds(5);
        repo.write_slot("save", "{\"a\":1}", fixed_now()).await.unwrap();
        repo.write_slot("save", "{\"a\":2}", later).await.unwrap();

        let slot = repo.read_slot("save").await.unwrap().unwrap();
        assert_eq!(slot.payload, "{\"a\":2}");
        assert_eq!(slot.updated_at, later);
        assert_eq!(repo.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn remove_reports_missing_slot() {
        let repo = InMemoryRepository::new();
        repo.write_slot("save", "{}", fixed_now()).await.unwrap();
        repo.remove_slot("save").await.unwrap();
        assert!(matches!(
            repo.remove_slot("save").await,
            Err(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn storage_in_memory_shares_one_backend() {
        let storage = Storage::in_memory();
        let clone = storage.clone();
        storage
            .slots
            .write_slot("save", "{}", fixed_now())
            .await
            .unwrap();
        assert!(clone.slots.read_slot("save").await.unwrap().is_some());
    }
}
