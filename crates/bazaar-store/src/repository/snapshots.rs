//! # Resource Snapshots
//!
//! The last successful fetch of each cached resource, persisted so the caches
//! can be warmed on the next launch before the network is reachable.
//!
//! Stored as JSON `{ resource, items: [{key, data}], refreshedAt }` under
//! `sync.snapshot.<resource>`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use bazaar_core::ResourceItem;

use crate::error::StoreResult;
use crate::kv::KeyValueStore;

const SNAPSHOT_PREFIX: &str = "sync.snapshot.";

/// Storage key of `resource`'s snapshot.
pub fn snapshot_key(resource: &str) -> String {
    format!("{SNAPSHOT_PREFIX}{resource}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSnapshot {
    pub resource: String,
    pub items: Vec<ResourceItem>,
    pub refreshed_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SnapshotStore {
    store: Arc<dyn KeyValueStore>,
}

impl SnapshotStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        SnapshotStore { store }
    }

    /// Returns the snapshot of `resource`. Undecodable data counts as absent.
    pub async fn load(&self, resource: &str) -> StoreResult<Option<ResourceSnapshot>> {
        let key = snapshot_key(resource);
        let Some(bytes) = self.store.load(&key).await? else {
            return Ok(None);
        };

        match serde_json::from_slice::<ResourceSnapshot>(&bytes) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                warn!(key = %key, error = %e, "Ignoring unreadable snapshot");
                Ok(None)
            }
        }
    }

    pub async fn save(&self, snapshot: &ResourceSnapshot) -> StoreResult<()> {
        let bytes = serde_json::to_vec(snapshot)?;
        self.store
            .save(&snapshot_key(&snapshot.resource), &bytes)
            .await
    }

    pub async fn remove(&self, resource: &str) -> StoreResult<()> {
        self.store.remove(&snapshot_key(resource)).await
    }
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore").finish_non_exhaustive()
    }
}
