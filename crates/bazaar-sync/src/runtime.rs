//! # Offline Runtime
//!
//! Wires the queue, the engine and the event bus together and owns their
//! background tasks.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          OfflineRuntime                                 │
//! │                                                                         │
//! │  OfflineRuntimeBuilder                                                  │
//! │    .with_storage(kv) .with_remote(api) .with_connectivity(oracle)       │
//! │    .build().await                                                       │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  start():    warm caches ─► engine timer ─► retry loop ─► drain        │
//! │  connectivity_changed(true) ─► drain                                    │
//! │  shutdown(): stop retry loop ─► stop engine (closes the bus)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use bazaar_store::{KeyValueStore, SnapshotStore};

use crate::config::OfflineConfig;
use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, Subscription};
use crate::queue::MutationQueue;
use crate::remote::{Connectivity, RemoteApi, SharedConnectivity};

// =============================================================================
// Status
// =============================================================================

/// Snapshot of the offline layer for the UI status bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeStatus {
    pub pending_count: usize,
    pub failed_count: usize,
    pub is_uploading: bool,
    pub is_online: bool,
    pub is_running: bool,
    pub last_refresh: Option<DateTime<Utc>>,
}

// =============================================================================
// Builder
// =============================================================================

/// Assembles an [`OfflineRuntime`] from its collaborators.
pub struct OfflineRuntimeBuilder {
    config: OfflineConfig,
    storage: Option<Arc<dyn KeyValueStore>>,
    remote: Option<Arc<dyn RemoteApi>>,
    connectivity: Option<Arc<dyn Connectivity>>,
    event_capacity: Option<usize>,
}

impl OfflineRuntimeBuilder {
    pub fn new(config: OfflineConfig) -> Self {
        OfflineRuntimeBuilder {
            config,
            storage: None,
            remote: None,
            connectivity: None,
            event_capacity: None,
        }
    }

    pub fn with_storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteApi>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Uses the host's connectivity oracle. Without one, the runtime keeps
    /// its own flag (initially online) driven by
    /// [`OfflineRuntime::connectivity_changed`].
    pub fn with_connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// Overrides `sync.event_capacity`.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = Some(capacity);
        self
    }

    /// Validates the configuration, loads the persisted queue and builds the
    /// caches. Nothing runs until [`OfflineRuntime::start`].
    pub async fn build(self) -> SyncResult<OfflineRuntime> {
        self.config.validate()?;

        let storage = self.storage.ok_or(SyncError::MissingComponent("storage"))?;
        let remote = self.remote.ok_or(SyncError::MissingComponent("remote"))?;

        let (connectivity, local_flag) = match self.connectivity {
            Some(connectivity) => (connectivity, None),
            None => {
                let flag = Arc::new(SharedConnectivity::default());
                (flag.clone() as Arc<dyn Connectivity>, Some(flag))
            }
        };

        let capacity = self.event_capacity.unwrap_or(self.config.sync.event_capacity);
        let bus = Arc::new(EventBus::new(capacity));

        let queue = MutationQueue::open(
            self.config.queue.clone(),
            storage.clone(),
            remote.clone(),
            connectivity.clone(),
            bus.clone(),
        )
        .await?;

        let engine = SyncEngine::new(
            remote,
            bus.clone(),
            &self.config.resources,
            Some(SnapshotStore::new(storage)),
        )?;

        info!(
            resources = self.config.resources.len(),
            event_capacity = capacity,
            "Offline runtime built"
        );

        Ok(OfflineRuntime {
            config: self.config,
            queue: Arc::new(queue),
            engine: Arc::new(engine),
            bus,
            connectivity,
            local_flag,
            lifecycle: Mutex::new(Lifecycle::default()),
        })
    }
}

// =============================================================================
// Runtime
// =============================================================================

#[derive(Default)]
struct Lifecycle {
    started: bool,
    shut_down: bool,
    retry_shutdown_tx: Option<mpsc::Sender<()>>,
    retry_handle: Option<JoinHandle<()>>,
}

/// The running offline layer.
pub struct OfflineRuntime {
    config: OfflineConfig,
    queue: Arc<MutationQueue>,
    engine: Arc<SyncEngine>,
    bus: Arc<EventBus>,
    connectivity: Arc<dyn Connectivity>,
    /// Set when the runtime owns the connectivity flag.
    local_flag: Option<Arc<SharedConnectivity>>,
    lifecycle: Mutex<Lifecycle>,
}

impl OfflineRuntime {
    pub fn builder(config: OfflineConfig) -> OfflineRuntimeBuilder {
        OfflineRuntimeBuilder::new(config)
    }

    /// Warms the caches, starts the refresh timer and the retry loop, then
    /// triggers a drain. Calling it again is a no-op.
    pub async fn start(&self) -> SyncResult<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.shut_down {
            return Err(SyncError::ShuttingDown);
        }
        if lifecycle.started {
            debug!("Offline runtime already started");
            return Ok(());
        }

        info!(online = self.connectivity.is_online(), "Starting offline runtime");

        self.engine.warm_from_snapshots().await;
        self.engine.start(self.config.sync.refresh_interval());

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let handle = tokio::spawn(
            self.queue
                .clone()
                .run_retry_loop(self.config.queue.retry_interval(), shutdown_rx),
        );
        lifecycle.retry_shutdown_tx = Some(shutdown_tx);
        lifecycle.retry_handle = Some(handle);
        lifecycle.started = true;

        self.queue.spawn_drain();

        info!("Offline runtime started");
        Ok(())
    }

    /// Records a connectivity change. Going online triggers a drain.
    pub fn connectivity_changed(&self, online: bool) {
        let changed = match &self.local_flag {
            Some(flag) => flag.set_online(online) != online,
            None => true,
        };

        if changed {
            info!(online, "Connectivity changed");
        }

        if online && !self.bus.is_closed() {
            self.queue.spawn_drain();
        }
    }

    pub async fn status(&self) -> RuntimeStatus {
        RuntimeStatus {
            pending_count: self.queue.pending_count().await,
            failed_count: self.queue.failed_count().await,
            is_uploading: self.queue.has_uploading().await,
            is_online: self.connectivity.is_online(),
            is_running: self.engine.is_running(),
            last_refresh: self.engine.latest_refresh().await,
        }
    }

    /// Stops the retry loop and the engine. Idempotent.
    pub async fn shutdown(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.shut_down {
            return;
        }
        lifecycle.shut_down = true;

        info!("Shutting down offline runtime");

        if let Some(tx) = lifecycle.retry_shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = lifecycle.retry_handle.take() {
            if let Err(e) = handle.await {
                error!(?e, "Mutation retry loop task failed");
            }
        }

        self.engine.stop().await;
        info!("Offline runtime shut down");
    }

    pub fn queue(&self) -> &Arc<MutationQueue> {
        &self.queue
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn events(&self) -> Subscription {
        self.bus.subscribe()
    }

    pub fn config(&self) -> &OfflineConfig {
        &self.config
    }
}

impl std::fmt::Debug for OfflineRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineRuntime")
            .field("queue", &self.queue)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceSettings;
    use crate::events::OfflineEvent;
    use crate::remote::testing::MockRemote;
    use bazaar_core::{ListingDraft, MutationPayload, MutationStatus, ResourceItem};
    use bazaar_store::MemoryStore;
    use std::time::Duration;

    fn config() -> OfflineConfig {
        let mut config = OfflineConfig::default();
        config.queue.inter_item_delay_ms = 0;
        config.resources = vec![ResourceSettings::new("listings", 10, Some(900))];
        config
    }

    fn listing() -> MutationPayload {
        MutationPayload::CreateListing {
            draft: ListingDraft {
                title: "Standing desk".into(),
                description: String::new(),
                price_cents: 12_000,
                currency: "EUR".into(),
                category: None,
                location: None,
            },
        }
    }

    async fn runtime(remote: Arc<MockRemote>, kv: Arc<MemoryStore>) -> OfflineRuntime {
        OfflineRuntimeBuilder::new(config())
            .with_storage(kv)
            .with_remote(remote)
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_missing_components() {
        let result = OfflineRuntimeBuilder::new(config())
            .with_remote(Arc::new(MockRemote::new()))
            .build()
            .await;
        assert!(matches!(result, Err(SyncError::MissingComponent("storage"))));

        let result = OfflineRuntimeBuilder::new(config())
            .with_storage(Arc::new(MemoryStore::new()))
            .build()
            .await;
        assert!(matches!(result, Err(SyncError::MissingComponent("remote"))));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = config();
        config.queue.max_attempts = 0;
        let result = OfflineRuntimeBuilder::new(config)
            .with_storage(Arc::new(MemoryStore::new()))
            .with_remote(Arc::new(MockRemote::new()))
            .build()
            .await;
        assert!(matches!(result, Err(SyncError::InvalidConfig(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_then_reconnect() {
        let remote = Arc::new(MockRemote::new());
        let rt = runtime(remote.clone(), Arc::new(MemoryStore::new())).await;
        rt.start().await.unwrap();

        rt.connectivity_changed(false);
        let id = rt.queue().enqueue(listing(), None).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let status = rt.status().await;
        assert_eq!(status.pending_count, 1);
        assert!(!status.is_online);
        assert!(status.is_running);

        rt.connectivity_changed(true);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(
            rt.queue().get(&id).await.unwrap().status,
            MutationStatus::Completed
        );
        assert_eq!(rt.status().await.pending_count, 0);
        rt.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_refreshes_and_warms() {
        let kv = Arc::new(MemoryStore::new());
        let remote = Arc::new(MockRemote::new());
        remote.set_fetch(
            "listings",
            Ok(vec![ResourceItem::new("l1", serde_json::json!({"title": "Lamp"}))]),
        );

        let rt = runtime(remote, kv.clone()).await;
        rt.start().await.unwrap();
        rt.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(rt.status().await.last_refresh.is_some());
        rt.shutdown().await;

        let offline = Arc::new(MockRemote::new());
        offline.set_fetch("listings", Err(crate::error::RemoteError::Network("down".into())));
        let restarted = runtime(offline, kv).await;
        restarted.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(restarted.engine().items("listings").await.unwrap().len(), 1);
        restarted.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_idempotent_and_closes_events() {
        let rt = runtime(Arc::new(MockRemote::new()), Arc::new(MemoryStore::new())).await;
        let mut events = rt.events();
        rt.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        rt.shutdown().await;
        rt.shutdown().await;

        while let Some(event) = events.recv().await {
            assert!(!matches!(event, OfflineEvent::MutationQueueChanged { .. }));
        }
        assert!(!rt.status().await.is_running);
        assert!(matches!(rt.start().await, Err(SyncError::ShuttingDown)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_with_unresponsive_remote() {
        let remote = Arc::new(MockRemote::new());
        remote.stop_responding();
        let rt = runtime(remote.clone(), Arc::new(MemoryStore::new())).await;
        rt.start().await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(remote.fetch_count(), 1);

        let stopped = tokio::time::timeout(Duration::from_secs(5), rt.shutdown()).await;
        assert!(stopped.is_ok());
        assert!(!rt.status().await.is_running);
    }
}
