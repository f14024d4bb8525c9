//! # Key-Value Storage Primitive
//!
//! The offline layer persists everything as opaque byte blobs under
//! well-known string keys. This trait is the only storage seam.
//!
//! ```text
//! ┌────────────────────────┐      ┌──────────────────────────┐
//! │  MutationRecordStore   │      │      SnapshotStore       │
//! │  offline.mutation_queue│      │  sync.snapshot.<name>    │
//! └───────────┬────────────┘      └────────────┬─────────────┘
//!             │   Arc<dyn KeyValueStore>       │
//!             └──────────────┬─────────────────┘
//!                  ┌─────────┴─────────┐
//!                  ▼                   ▼
//!            SqliteStore          MemoryStore
//!            (device)             (tests, previews)
//! ```

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};

/// Persistent key-value storage.
///
/// A `save` replaces the whole value under `key`; there are no partial writes.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the bytes stored under `key`, if any.
    async fn load(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    async fn save(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Deletes `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> StoreResult<()>;
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// Process-local store. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> StoreError {
        StoreError::Internal("memory store lock poisoned".to_string())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn load(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        Ok(entries.get(key).cloned())
    }

    async fn save(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let mut entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.load("k").await.unwrap(), None);

        store.save("k", b"v1").await.unwrap();
        store.save("k", b"v2").await.unwrap();
        assert_eq!(store.load("k").await.unwrap(), Some(b"v2".to_vec()));
        assert_eq!(store.len(), 1);

        store.remove("k").await.unwrap();
        store.remove("k").await.unwrap();
        assert!(store.is_empty());
    }
}
