//! # Mutation Record Store
//!
//! Serializes the pending-mutation list to and from the key-value store.
//!
//! ## Stored Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  key: offline.mutation_queue                                            │
//! │                                                                         │
//! │  { "schemaVersion": 1,                                                  │
//! │    "mutations": [ PendingMutation, ... ] }      ← written               │
//! │                                                                         │
//! │  [ PendingMutation, ... ]                        ← accepted on load     │
//! │                                                  (legacy, unversioned)  │
//! │                                                                         │
//! │  anything else, or schemaVersion != 1            → empty queue + warn   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every save writes the whole list. The queue is small (a handful of user
//! actions) so there is no incremental format.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use bazaar_core::PendingMutation;

use crate::error::{StoreError, StoreResult};
use crate::kv::KeyValueStore;

/// Envelope version written by this build.
pub const MUTATION_SCHEMA_VERSION: u32 = 1;

/// Default storage key of the mutation list.
pub const DEFAULT_MUTATION_KEY: &str = "offline.mutation_queue";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeRef<'a> {
    schema_version: u32,
    mutations: &'a [PendingMutation],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    schema_version: u32,
    mutations: Vec<PendingMutation>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredLayout {
    Versioned(Envelope),
    Legacy(Vec<PendingMutation>),
}

/// Encodes `mutations` as the current envelope.
pub fn encode_mutations(mutations: &[PendingMutation]) -> StoreResult<Vec<u8>> {
    let envelope = EnvelopeRef {
        schema_version: MUTATION_SCHEMA_VERSION,
        mutations,
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Decodes either layout. `key` is only used for error context.
pub fn decode_mutations(key: &str, bytes: &[u8]) -> StoreResult<Vec<PendingMutation>> {
    let layout: StoredLayout =
        serde_json::from_slice(bytes).map_err(|e| StoreError::corrupt(key, e.to_string()))?;

    match layout {
        StoredLayout::Versioned(envelope) if envelope.schema_version == MUTATION_SCHEMA_VERSION => {
            Ok(envelope.mutations)
        }
        StoredLayout::Versioned(envelope) => Err(StoreError::corrupt(
            key,
            format!("unsupported schemaVersion {}", envelope.schema_version),
        )),
        StoredLayout::Legacy(mutations) => {
            debug!(key = %key, count = mutations.len(), "Loaded legacy mutation layout");
            Ok(mutations)
        }
    }
}

/// Loads and saves the mutation list under one key.
#[derive(Clone)]
pub struct MutationRecordStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl MutationRecordStore {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        MutationRecordStore {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Loads the persisted list.
    ///
    /// Records left `in_flight` by a crash come back as `pending`. Corrupt or
    /// unreadable data yields an empty list; storage failures propagate.
    pub async fn load(&self) -> StoreResult<Vec<PendingMutation>> {
        let bytes = match self.store.load(&self.key).await? {
            Some(bytes) => bytes,
            None => return Ok(Vec::new()),
        };

        let mut mutations = match decode_mutations(&self.key, &bytes) {
            Ok(mutations) => mutations,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable mutation queue");
                return Ok(Vec::new());
            }
        };

        let mut normalized = 0usize;
        for mutation in mutations.iter_mut() {
            if mutation.normalize_after_restart() {
                normalized += 1;
            }
        }
        if normalized > 0 {
            debug!(count = normalized, "Reset interrupted uploads to pending");
        }

        Ok(mutations)
    }

    /// Replaces the persisted list with `mutations`.
    pub async fn save(&self, mutations: &[PendingMutation]) -> StoreResult<()> {
        let bytes = encode_mutations(mutations)?;
        self.store.save(&self.key, &bytes).await
    }

    pub async fn clear(&self) -> StoreResult<()> {
        self.store.remove(&self.key).await
    }
}

impl std::fmt::Debug for MutationRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationRecordStore")
            .field("key", &self.key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use bazaar_core::{ListingDraft, MutationPayload, MutationStatus};
    use chrono::Utc;

    fn mutation(title: &str) -> PendingMutation {
        PendingMutation::new(
            MutationPayload::CreateListing {
                draft: ListingDraft {
                    title: title.to_string(),
                    description: String::new(),
                    price_cents: 1_000,
                    currency: "USD".to_string(),
                    category: None,
                    location: None,
                },
            },
            Some(vec![1, 2, 3]),
            Utc::now(),
        )
    }

    fn records() -> (Arc<MemoryStore>, MutationRecordStore) {
        let kv = Arc::new(MemoryStore::new());
        let store = MutationRecordStore::new(kv.clone(), DEFAULT_MUTATION_KEY);
        (kv, store)
    }

    #[tokio::test]
    async fn test_missing_key_is_empty() {
        let (_, store) = records();
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_roundtrip_normalizes_in_flight() {
        let (_, store) = records();
        let mut uploading = mutation("lamp");
        uploading.begin_attempt(Utc::now()).unwrap();
        let waiting = mutation("desk");

        store.save(&[uploading.clone(), waiting.clone()]).await.unwrap();
        let loaded = store.load().await.unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, uploading.id);
        assert_eq!(loaded[0].status, MutationStatus::Pending);
        assert_eq!(loaded[0].attachment, Some(vec![1, 2, 3]));
        assert_eq!(loaded[1], waiting);
    }

    #[tokio::test]
    async fn test_envelope_is_versioned() {
        let (kv, store) = records();
        store.save(&[mutation("chair")]).await.unwrap();

        let raw = kv.load(DEFAULT_MUTATION_KEY).await.unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json["schemaVersion"], 1);
        assert_eq!(json["mutations"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_legacy_array_accepted() {
        let (kv, store) = records();
        let legacy = serde_json::to_vec(&vec![mutation("sofa")]).unwrap();
        kv.save(DEFAULT_MUTATION_KEY, &legacy).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_data_is_empty() {
        let (kv, store) = records();
        kv.save(DEFAULT_MUTATION_KEY, b"{\"schemaVer").await.unwrap();
        assert!(store.load().await.unwrap().is_empty());

        kv.save(DEFAULT_MUTATION_KEY, br#"{"schemaVersion": 7, "mutations": []}"#)
            .await
            .unwrap();
        assert!(store.load().await.unwrap().is_empty());
    }

    #[test]
    fn test_unknown_version_is_corrupt() {
        let err = decode_mutations("k", br#"{"schemaVersion": 2, "mutations": []}"#).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
