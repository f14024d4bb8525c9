//! # Sync Engine
//!
//! Keeps one bounded cache per server resource fresh on a fixed cadence.
//!
//! ## Refresh Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SyncEngine timer                               │
//! │                                                                         │
//! │  tick 1 ──► refresh_all(Initial)   SyncProgress 1..N, complete         │
//! │  tick 2 ──► refresh_all(Periodic)  no progress events                  │
//! │  ...        (skipped while another refresh is running)                  │
//! │                                                                         │
//! │  per resource:                                                          │
//! │    remote.fetch(name) ──ok──► replace cache items, drop missing keys    │
//! │                       │       persist snapshot, stamp last_refreshed    │
//! │                       └─err─► keep cached items (stale but available)   │
//! │                                                                         │
//! │  pass done ──► DataUpdated { scope: "all" }                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Cache reads never touch the network. A resource's TTL marks its cache as
//! stale and moves it to the front of the next pass; it never hides items.
//! Only a successful fetch removes them.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use bazaar_core::{BoundedCache, CacheStats, ResourceItem};
use bazaar_store::{ResourceSnapshot, SnapshotStore};

use crate::config::ResourceSettings;
use crate::error::{RemoteError, SyncError, SyncResult};
use crate::events::{DataScope, EventBus, OfflineEvent};
use crate::flight::SingleFlight;
use crate::remote::RemoteApi;

// =============================================================================
// Refresh Mode & Outcome
// =============================================================================

/// Why a refresh runs. Only `Periodic` refreshes are silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    Initial,
    Periodic,
    Manual,
}

impl RefreshMode {
    fn reports_progress(self) -> bool {
        !matches!(self, RefreshMode::Periodic)
    }
}

/// A resource whose fetch failed during a refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceFailure {
    pub resource: String,
    pub error: RemoteError,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    pub refreshed: Vec<String>,
    pub errors: Vec<ResourceFailure>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// Another refresh was running, or the engine is stopped.
    Skipped,
    Completed(RefreshReport),
}

// =============================================================================
// Sync Engine
// =============================================================================

struct ResourceCache {
    cache: BoundedCache<String, Value>,
    ttl: Option<Duration>,
    last_refreshed: Option<DateTime<Utc>>,
}

impl ResourceCache {
    fn age(&self) -> Option<Duration> {
        self.last_refreshed
            .map(|at| (Utc::now() - at).to_std().unwrap_or(Duration::ZERO))
    }

    /// Never refreshed, or older than the TTL.
    fn is_stale(&self) -> bool {
        match (self.age(), self.ttl) {
            (None, _) => true,
            (Some(age), Some(ttl)) => age >= ttl,
            (Some(_), None) => false,
        }
    }
}

struct EngineTimer {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Owns the resource caches and their refresh timer.
pub struct SyncEngine {
    remote: Arc<dyn RemoteApi>,
    bus: Arc<EventBus>,
    snapshots: Option<SnapshotStore>,
    /// Resource names in refresh order.
    order: Vec<String>,
    caches: HashMap<String, Mutex<ResourceCache>>,
    flight: SingleFlight,
    stopped: AtomicBool,
    timer: std::sync::Mutex<Option<EngineTimer>>,
}

impl SyncEngine {
    /// Builds one cache per resource.
    ///
    /// ## Errors
    /// `Core(InvalidCacheSize)` for a resource with `max_size == 0`, and
    /// `InvalidConfig` for a duplicate resource name.
    pub fn new(
        remote: Arc<dyn RemoteApi>,
        bus: Arc<EventBus>,
        resources: &[ResourceSettings],
        snapshots: Option<SnapshotStore>,
    ) -> SyncResult<Self> {
        let mut order = Vec::with_capacity(resources.len());
        let mut caches = HashMap::with_capacity(resources.len());

        for settings in resources {
            let name = settings.name.clone();
            let entry = ResourceCache {
                cache: BoundedCache::new(settings.max_size)?,
                ttl: settings.ttl(),
                last_refreshed: None,
            };
            if caches.insert(name.clone(), Mutex::new(entry)).is_some() {
                return Err(SyncError::InvalidConfig(format!(
                    "resource '{name}' is configured twice"
                )));
            }
            order.push(name);
        }

        Ok(SyncEngine {
            remote,
            bus,
            snapshots,
            order,
            caches,
            flight: SingleFlight::new(),
            stopped: AtomicBool::new(false),
            timer: std::sync::Mutex::new(None),
        })
    }

    /// Names of the tracked resources, in refresh order.
    pub fn resources(&self) -> &[String] {
        &self.order
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Fills the caches from persisted snapshots. Returns how many resources
    /// were warmed.
    ///
    /// `cache_age` reports the snapshot's age, so a snapshot older than the
    /// TTL is refreshed first on the next pass.
    pub async fn warm_from_snapshots(&self) -> usize {
        let Some(snapshots) = &self.snapshots else {
            return 0;
        };

        let mut warmed = 0;
        for name in &self.order {
            let snapshot = match snapshots.load(name).await {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => continue,
                Err(e) => {
                    warn!(resource = %name, error = %e, "Failed to load snapshot");
                    continue;
                }
            };

            let Some(slot) = self.caches.get(name) else {
                continue;
            };
            let mut entry = slot.lock().await;
            for item in snapshot.items {
                entry.cache.put(item.key, item.data, None);
            }
            entry.last_refreshed = Some(snapshot.refreshed_at);
            drop(entry);

            debug!(resource = %name, refreshed_at = %snapshot.refreshed_at, "Cache warmed from snapshot");
            self.bus.publish(OfflineEvent::DataUpdated {
                scope: DataScope::Resource(name.clone()),
            });
            warmed += 1;
        }

        if warmed > 0 {
            info!(count = warmed, "Caches warmed from snapshots");
        }
        warmed
    }

    /// Spawns the refresh timer. Returns false if it is already running or
    /// the engine has been stopped.
    pub fn start(self: &Arc<Self>, interval: Duration) -> bool {
        if self.stopped.load(Ordering::SeqCst) {
            warn!("Sync engine already stopped, not starting");
            return false;
        }

        let mut timer = self.timer_slot();
        if timer.is_some() {
            debug!("Sync engine already started");
            return false;
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let engine = Arc::clone(self);
        let handle = tokio::spawn(engine.run_timer(interval, shutdown_rx));
        *timer = Some(EngineTimer { shutdown_tx, handle });

        info!(?interval, resources = self.order.len(), "Sync engine started");
        true
    }

    /// Cancels the timer and closes the event bus. Idempotent.
    ///
    /// A refresh pass in progress on the timer is abandoned, even if a fetch
    /// never answers. No event is published once this returns.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        let timer = self.timer_slot().take();
        if let Some(timer) = timer {
            let _ = timer.shutdown_tx.send(()).await;
            if let Err(e) = timer.handle.await {
                error!(?e, "Sync engine timer task failed");
            }
        }

        self.bus.close();
        info!("Sync engine stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst) && self.timer_slot().is_some()
    }

    pub fn is_refreshing(&self) -> bool {
        self.flight.is_running()
    }

    async fn run_timer(self: Arc<Self>, interval: Duration, mut shutdown_rx: mpsc::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut mode = RefreshMode::Initial;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown_rx.recv() => break,
            }

            tokio::select! {
                outcome = self.refresh_all(mode) => match outcome {
                    RefreshOutcome::Skipped => {
                        debug!(?mode, "Refresh tick skipped");
                    }
                    RefreshOutcome::Completed(report) if !report.errors.is_empty() => {
                        warn!(failed = report.errors.len(), "Refresh finished with errors");
                    }
                    RefreshOutcome::Completed(_) => {}
                },
                _ = shutdown_rx.recv() => {
                    info!("Refresh abandoned by shutdown");
                    break;
                }
            }
            mode = RefreshMode::Periodic;
        }

        info!("Sync engine timer shut down");
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    /// Refreshes every tracked resource, unless a refresh is already running.
    ///
    /// Stale resources go first, the rest keep their configured order. A
    /// failed fetch leaves that resource's cache untouched and is reported in
    /// the returned [`RefreshReport`]; the other resources still refresh.
    pub async fn refresh_all(&self, mode: RefreshMode) -> RefreshOutcome {
        if self.stopped.load(Ordering::SeqCst) {
            return RefreshOutcome::Skipped;
        }
        let Some(_flight) = self.flight.try_begin() else {
            debug!(?mode, "Refresh already running, skipping");
            return RefreshOutcome::Skipped;
        };

        let order = self.refresh_order().await;
        let total_steps = order.len();
        let mut report = RefreshReport::default();
        debug!(?mode, resources = total_steps, "Refresh starting");

        for (index, name) in order.into_iter().enumerate() {
            if self.stopped.load(Ordering::SeqCst) {
                debug!("Engine stopped mid-refresh");
                return RefreshOutcome::Completed(report);
            }

            if mode.reports_progress() {
                self.bus.publish(OfflineEvent::SyncProgress {
                    step: index + 1,
                    total_steps,
                    message: format!("Refreshing {name}"),
                    is_complete: false,
                    has_error: !report.errors.is_empty(),
                });
            }

            match self.remote.fetch(name).await {
                Ok(items) => {
                    self.apply(name, items).await;
                    report.refreshed.push(name.clone());
                }
                Err(e) => {
                    warn!(resource = %name, error = %e, "Refresh failed, keeping cached data");
                    report.errors.push(ResourceFailure {
                        resource: name.clone(),
                        error: e,
                    });
                }
            }
        }

        if mode.reports_progress() {
            let has_error = !report.errors.is_empty();
            self.bus.publish(OfflineEvent::SyncProgress {
                step: total_steps,
                total_steps,
                message: if has_error {
                    "Sync finished with errors".to_string()
                } else {
                    "Sync complete".to_string()
                },
                is_complete: true,
                has_error,
            });
        }
        self.bus.publish(OfflineEvent::DataUpdated {
            scope: DataScope::All,
        });

        info!(
            ?mode,
            refreshed = report.refreshed.len(),
            failed = report.errors.len(),
            "Refresh finished"
        );
        RefreshOutcome::Completed(report)
    }

    async fn refresh_order(&self) -> Vec<&String> {
        let mut stale = Vec::new();
        let mut fresh = Vec::new();
        for name in &self.order {
            let is_stale = match self.caches.get(name) {
                Some(slot) => slot.lock().await.is_stale(),
                None => true,
            };
            if is_stale {
                stale.push(name);
            } else {
                fresh.push(name);
            }
        }
        stale.extend(fresh);
        stale
    }

    /// Manual refresh outside the timer cadence, with progress events.
    pub async fn force_refresh_now(&self) -> RefreshOutcome {
        info!("Manual refresh requested");
        self.refresh_all(RefreshMode::Manual).await
    }

    /// Replaces the cached items of `name` with a fresh fetch.
    async fn apply(&self, name: &str, items: Vec<ResourceItem>) {
        let Some(slot) = self.caches.get(name) else {
            return;
        };
        let refreshed_at = Utc::now();

        {
            let mut entry = slot.lock().await;

            let fresh: HashSet<&str> = items.iter().map(|item| item.key.as_str()).collect();
            let missing: Vec<String> = entry
                .cache
                .keys_lru_first()
                .into_iter()
                .filter(|key| !fresh.contains(key.as_str()))
                .cloned()
                .collect();
            for key in &missing {
                entry.cache.remove(key);
            }

            for item in &items {
                entry.cache.put(item.key.clone(), item.data.clone(), None);
            }
            entry.last_refreshed = Some(refreshed_at);

            debug!(
                resource = %name,
                items = items.len(),
                invalidated = missing.len(),
                "Cache refreshed"
            );
        }

        if let Some(snapshots) = &self.snapshots {
            let snapshot = ResourceSnapshot {
                resource: name.to_string(),
                items,
                refreshed_at,
            };
            if let Err(e) = snapshots.save(&snapshot).await {
                error!(resource = %name, error = %e, "Failed to persist snapshot");
            }
        }
    }

    // =========================================================================
    // Cache Reads
    // =========================================================================

    /// Cached value of `key`, promoting it in its resource's LRU order.
    pub async fn get(&self, resource: &str, key: &str) -> SyncResult<Option<Value>> {
        let mut entry = self.slot(resource)?.lock().await;
        Ok(entry.cache.get(&key.to_string()).cloned())
    }

    /// Every live cached item of `resource`, most recently used first.
    pub async fn items(&self, resource: &str) -> SyncResult<Vec<ResourceItem>> {
        let entry = self.slot(resource)?.lock().await;
        Ok(entry
            .cache
            .iter()
            .map(|(key, data)| ResourceItem::new(key.clone(), data.clone()))
            .collect())
    }

    /// Time since `resource` was last refreshed (or warmed from a snapshot).
    pub async fn cache_age(&self, resource: &str) -> SyncResult<Option<Duration>> {
        Ok(self.slot(resource)?.lock().await.age())
    }

    /// Returns true if `resource` was never refreshed or is older than its
    /// TTL. Stale items are still served.
    pub async fn is_stale(&self, resource: &str) -> SyncResult<bool> {
        Ok(self.slot(resource)?.lock().await.is_stale())
    }

    pub async fn last_refreshed(&self, resource: &str) -> SyncResult<Option<DateTime<Utc>>> {
        Ok(self.slot(resource)?.lock().await.last_refreshed)
    }

    /// Most recent refresh across all resources.
    pub async fn latest_refresh(&self) -> Option<DateTime<Utc>> {
        let mut latest = None;
        for slot in self.caches.values() {
            latest = latest.max(slot.lock().await.last_refreshed);
        }
        latest
    }

    pub async fn cache_stats(&self, resource: &str) -> SyncResult<CacheStats> {
        Ok(self.slot(resource)?.lock().await.cache.stats())
    }

    fn slot(&self, resource: &str) -> SyncResult<&Mutex<ResourceCache>> {
        self.caches
            .get(resource)
            .ok_or_else(|| SyncError::UnknownResource(resource.to_string()))
    }

    fn timer_slot(&self) -> MutexGuard<'_, Option<EngineTimer>> {
        self.timer.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("resources", &self.order)
            .field("stopped", &self.stopped.load(Ordering::SeqCst))
            .field("refreshing", &self.flight.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Subscription;
    use crate::remote::testing::MockRemote;
    use bazaar_store::MemoryStore;
    use serde_json::json;

    fn resources() -> Vec<ResourceSettings> {
        vec![
            ResourceSettings::new("listings", 3, Some(900)),
            ResourceSettings::new("categories", 10, None),
        ]
    }

    fn engine_with(remote: Arc<MockRemote>, snapshots: Option<SnapshotStore>) -> (Arc<SyncEngine>, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new(64));
        let engine = SyncEngine::new(remote, bus.clone(), &resources(), snapshots).unwrap();
        (Arc::new(engine), bus)
    }

    fn listing(key: &str, title: &str) -> ResourceItem {
        ResourceItem::new(key, json!({ "title": title }))
    }

    fn drain_events(sub: &mut Subscription) -> Vec<OfflineEvent> {
        std::iter::from_fn(|| sub.try_recv()).collect()
    }

    #[test]
    fn test_zero_size_resource_rejected() {
        let result = SyncEngine::new(
            Arc::new(MockRemote::new()),
            Arc::new(EventBus::default()),
            &[ResourceSettings::new("listings", 0, None)],
            None,
        );
        assert!(matches!(
            result,
            Err(SyncError::Core(bazaar_core::CoreError::InvalidCacheSize(0)))
        ));
    }

    #[tokio::test]
    async fn test_refresh_populates_cache() {
        let remote = Arc::new(MockRemote::new());
        remote.set_fetch("listings", Ok(vec![listing("l1", "Bike"), listing("l2", "Desk")]));
        let (engine, _bus) = engine_with(remote, None);

        assert_eq!(engine.cache_age("listings").await.unwrap(), None);

        let outcome = engine.refresh_all(RefreshMode::Periodic).await;
        let RefreshOutcome::Completed(report) = outcome else {
            panic!("refresh skipped");
        };
        assert_eq!(report.refreshed, vec!["listings", "categories"]);
        assert!(report.errors.is_empty());

        assert_eq!(
            engine.get("listings", "l1").await.unwrap(),
            Some(json!({ "title": "Bike" }))
        );
        assert_eq!(engine.items("listings").await.unwrap().len(), 2);
        assert!(engine.cache_age("listings").await.unwrap().is_some());
        assert!(engine.latest_refresh().await.is_some());
    }

    #[tokio::test]
    async fn test_missing_keys_invalidated() {
        let remote = Arc::new(MockRemote::new());
        remote.set_fetch("listings", Ok(vec![listing("l1", "Bike"), listing("l2", "Desk")]));
        let (engine, _bus) = engine_with(remote.clone(), None);
        engine.refresh_all(RefreshMode::Periodic).await;

        remote.set_fetch("listings", Ok(vec![listing("l2", "Desk (reduced)")]));
        engine.refresh_all(RefreshMode::Periodic).await;

        assert_eq!(engine.get("listings", "l1").await.unwrap(), None);
        assert_eq!(
            engine.get("listings", "l2").await.unwrap(),
            Some(json!({ "title": "Desk (reduced)" }))
        );
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_stale_data() {
        let remote = Arc::new(MockRemote::new());
        remote.set_fetch("listings", Ok(vec![listing("l1", "Bike")]));
        let (engine, _bus) = engine_with(remote.clone(), None);
        engine.refresh_all(RefreshMode::Periodic).await;
        let first = engine.last_refreshed("listings").await.unwrap();

        remote.set_fetch("listings", Err(RemoteError::Network("no route to host".into())));
        let RefreshOutcome::Completed(report) = engine.refresh_all(RefreshMode::Periodic).await else {
            panic!("refresh skipped");
        };

        assert_eq!(report.refreshed, vec!["categories"]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].resource, "listings");
        assert_eq!(
            engine.get("listings", "l1").await.unwrap(),
            Some(json!({ "title": "Bike" }))
        );
        assert_eq!(engine.last_refreshed("listings").await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_cache_bounded_by_resource_size() {
        let remote = Arc::new(MockRemote::new());
        let items = (0..5).map(|n| listing(&format!("l{n}"), "x")).collect();
        remote.set_fetch("listings", Ok(items));
        let (engine, _bus) = engine_with(remote, None);
        engine.refresh_all(RefreshMode::Periodic).await;

        let stats = engine.cache_stats("listings").await.unwrap();
        assert_eq!(stats.current_size, 3);
        assert_eq!(stats.evictions, 2);
        assert_eq!(engine.get("listings", "l0").await.unwrap(), None);
        assert!(engine.get("listings", "l4").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_resource() {
        let (engine, _bus) = engine_with(Arc::new(MockRemote::new()), None);
        assert!(matches!(
            engine.items("reviews").await,
            Err(SyncError::UnknownResource(name)) if name == "reviews"
        ));
    }

    #[tokio::test]
    async fn test_manual_refresh_reports_progress() {
        let remote = Arc::new(MockRemote::new());
        remote.set_fetch("categories", Err(RemoteError::Timeout(30)));
        let (engine, bus) = engine_with(remote, None);
        let mut sub = bus.subscribe();

        engine.force_refresh_now().await;

        let events = drain_events(&mut sub);
        assert_eq!(events.len(), 4);
        assert!(matches!(
            &events[0],
            OfflineEvent::SyncProgress { step: 1, total_steps: 2, is_complete: false, has_error: false, .. }
        ));
        assert!(matches!(
            &events[1],
            OfflineEvent::SyncProgress { step: 2, is_complete: false, .. }
        ));
        assert!(matches!(
            &events[2],
            OfflineEvent::SyncProgress { is_complete: true, has_error: true, .. }
        ));
        assert_eq!(
            events[3],
            OfflineEvent::DataUpdated {
                scope: DataScope::All
            }
        );
    }

    #[tokio::test]
    async fn test_periodic_refresh_is_silent_except_data_updated() {
        let (engine, bus) = engine_with(Arc::new(MockRemote::new()), None);
        let mut sub = bus.subscribe();

        engine.refresh_all(RefreshMode::Periodic).await;

        assert_eq!(
            drain_events(&mut sub),
            vec![OfflineEvent::DataUpdated {
                scope: DataScope::All
            }]
        );
    }

    #[tokio::test]
    async fn test_snapshots_persist_and_warm() {
        let kv = Arc::new(MemoryStore::new());
        let remote = Arc::new(MockRemote::new());
        remote.set_fetch("listings", Ok(vec![listing("l1", "Bike")]));

        let (engine, _bus) = engine_with(remote, Some(SnapshotStore::new(kv.clone())));
        engine.refresh_all(RefreshMode::Periodic).await;
        let refreshed = engine.last_refreshed("listings").await.unwrap();

        let offline = Arc::new(MockRemote::new());
        let (restarted, _bus) = engine_with(offline.clone(), Some(SnapshotStore::new(kv)));
        assert_eq!(restarted.warm_from_snapshots().await, 2);

        assert_eq!(
            restarted.get("listings", "l1").await.unwrap(),
            Some(json!({ "title": "Bike" }))
        );
        assert_eq!(restarted.last_refreshed("listings").await.unwrap(), refreshed);
        assert_eq!(offline.fetch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_runs_initial_then_periodic() {
        let remote = Arc::new(MockRemote::new());
        let (engine, bus) = engine_with(remote.clone(), None);
        let mut sub = bus.subscribe();

        assert!(engine.start(Duration::from_secs(300)));
        assert!(!engine.start(Duration::from_secs(300)));
        assert!(engine.is_running());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(remote.fetch_count(), 2);
        let initial = drain_events(&mut sub);
        assert!(initial
            .iter()
            .any(|e| matches!(e, OfflineEvent::SyncProgress { is_complete: true, .. })));

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(remote.fetch_count(), 4);
        let periodic = drain_events(&mut sub);
        assert!(periodic
            .iter()
            .all(|e| !matches!(e, OfflineEvent::SyncProgress { .. })));

        engine.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_silences_events() {
        let remote = Arc::new(MockRemote::new());
        let (engine, bus) = engine_with(remote.clone(), None);
        let mut sub = bus.subscribe();
        engine.start(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(1)).await;
        drain_events(&mut sub);

        engine.stop().await;
        engine.stop().await;
        assert!(!engine.is_running());
        assert!(bus.is_closed());

        let fetches = remote.fetch_count();
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(remote.fetch_count(), fetches);
        assert_eq!(engine.force_refresh_now().await, RefreshOutcome::Skipped);
        assert_eq!(sub.recv().await, None);
        assert!(!engine.start(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn test_expired_cache_still_served_after_failed_refresh() {
        let remote = Arc::new(MockRemote::new());
        remote.set_fetch("listings", Ok(vec![listing("l1", "Bike")]));
        let bus = Arc::new(EventBus::new(16));
        let engine = SyncEngine::new(
            remote.clone(),
            bus,
            &[ResourceSettings::new("listings", 10, Some(1))],
            None,
        )
        .unwrap();
        engine.refresh_all(RefreshMode::Periodic).await;
        assert!(!engine.is_stale("listings").await.unwrap());

        remote.set_fetch("listings", Err(RemoteError::Network("airplane mode".into())));
        tokio::time::sleep(Duration::from_millis(1_200)).await;
        engine.refresh_all(RefreshMode::Periodic).await;

        assert_eq!(
            engine.get("listings", "l1").await.unwrap(),
            Some(json!({ "title": "Bike" }))
        );
        assert_eq!(engine.items("listings").await.unwrap().len(), 1);
        assert!(engine.is_stale("listings").await.unwrap());
        assert!(engine.cache_age("listings").await.unwrap().unwrap() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_stale_resources_refresh_first() {
        let remote = Arc::new(MockRemote::new());
        let engine = SyncEngine::new(
            remote,
            Arc::new(EventBus::new(16)),
            &[
                ResourceSettings::new("categories", 10, None),
                ResourceSettings::new("listings", 10, Some(0)),
            ],
            None,
        )
        .unwrap();

        let RefreshOutcome::Completed(first) = engine.refresh_all(RefreshMode::Periodic).await else {
            panic!("refresh skipped");
        };
        assert_eq!(first.refreshed, vec!["categories", "listings"]);

        let RefreshOutcome::Completed(second) = engine.refresh_all(RefreshMode::Periodic).await else {
            panic!("refresh skipped");
        };
        assert_eq!(second.refreshed, vec!["listings", "categories"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_abandons_unanswered_fetch() {
        let remote = Arc::new(MockRemote::new());
        remote.stop_responding();
        let (engine, bus) = engine_with(remote.clone(), None);

        engine.start(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(remote.fetch_count(), 1);
        assert!(engine.is_refreshing());

        let stopped = tokio::time::timeout(Duration::from_secs(2), engine.stop()).await;
        assert!(stopped.is_ok());
        assert!(!engine.is_refreshing());
        assert!(bus.is_closed());
    }
}
