//! # Mutation Queue
//!
//! Durable list of user writes waiting for delivery, and the drain pass that
//! uploads them.
//!
//! ## Drain Pass
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         MutationQueue.drain()                           │
//! │                                                                         │
//! │  single-flight flag taken? ──yes──► Skipped(AlreadyRunning)            │
//! │  offline?                  ──yes──► Skipped(Offline)                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │ loop (oldest createdAt first, each record once per pass)        │   │
//! │  │                                                                 │   │
//! │  │  1. [lock] pending → in_flight, persist, notify   [unlock]     │   │
//! │  │  2. remote.create(payload) + upload_attachment(bytes)           │   │
//! │  │  3. [lock] completed | pending | failed, persist, notify       │   │
//! │  │  4. sleep(inter_item_delay)                                     │   │
//! │  │                                                                 │   │
//! │  │  stops early if connectivity drops                              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  prune completed records older than the retention window               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Records enqueued while a pass runs are picked up by the same pass. The
//! state lock is never held across a remote call.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use bazaar_core::{MutationPayload, MutationStatus, PendingMutation, RemoteId};
use bazaar_store::{KeyValueStore, MutationRecordStore, StoreError, StoreResult};

use crate::config::QueueSettings;
use crate::error::{RemoteError, SyncError, SyncResult};
use crate::events::{EventBus, OfflineEvent};
use crate::flight::SingleFlight;
use crate::remote::{Connectivity, RemoteApi};

// =============================================================================
// Drain Outcome
// =============================================================================

/// Why a pass did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyRunning,
    Offline,
}

/// Counters of one completed drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub attempted: usize,
    pub succeeded: usize,
    /// Records that went back to `pending` with budget left.
    pub requeued: usize,
    /// Records that exhausted their budget (or were rejected for good).
    pub failed: usize,
    pub pruned: usize,
    /// Connectivity dropped before every eligible record was attempted.
    pub interrupted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    Skipped(SkipReason),
    Completed(DrainReport),
}

// =============================================================================
// Mutation Queue
// =============================================================================

/// Owns the pending mutations and drives their upload.
pub struct MutationQueue {
    mutations: Mutex<Vec<PendingMutation>>,
    records: MutationRecordStore,
    remote: Arc<dyn RemoteApi>,
    connectivity: Arc<dyn Connectivity>,
    bus: Arc<EventBus>,
    settings: QueueSettings,
    flight: SingleFlight,
}

impl MutationQueue {
    /// Loads the persisted list and returns a ready queue.
    ///
    /// Records interrupted mid-upload come back as `pending`. Unreadable data
    /// yields an empty queue; a failing storage read is an error.
    pub async fn open(
        settings: QueueSettings,
        store: Arc<dyn KeyValueStore>,
        remote: Arc<dyn RemoteApi>,
        connectivity: Arc<dyn Connectivity>,
        bus: Arc<EventBus>,
    ) -> SyncResult<Self> {
        let records = MutationRecordStore::new(store, settings.storage_key.clone());
        let mutations = records.load().await?;

        info!(
            key = %records.key(),
            count = mutations.len(),
            "Mutation queue opened"
        );

        Ok(MutationQueue {
            mutations: Mutex::new(mutations),
            records,
            remote,
            connectivity,
            bus,
            settings,
            flight: SingleFlight::new(),
        })
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    // =========================================================================
    // Mutating Operations
    // =========================================================================

    /// Queues a write and returns its id. Never fails.
    ///
    /// The record is persisted before observers are notified. A persistence
    /// failure is logged and the record stays in memory. A drain is spawned
    /// in the background; this call never waits on the network.
    pub async fn enqueue(self: &Arc<Self>, payload: MutationPayload, attachment: Option<Vec<u8>>) -> String {
        let mutation = PendingMutation::new(payload, attachment, Utc::now());
        let id = mutation.id.clone();
        let operation = mutation.payload.operation().to_string();

        {
            let mut mutations = self.mutations.lock().await;
            mutations.push(mutation);
            let _ = self.commit(&mutations).await;
        }

        info!(id = %id, operation = %operation, "Mutation queued");
        self.spawn_drain();
        id
    }

    /// `failed → pending` with a fresh attempt budget, then spawns a drain.
    ///
    /// ## Errors
    /// - `MutationNotFound` for an unknown id
    /// - `Core(InvalidTransition)` if the record is not `failed`
    /// - `Storage` if the reset could not be persisted; the record stays `failed`
    pub async fn retry(self: &Arc<Self>, id: &str) -> SyncResult<()> {
        {
            let mut mutations = self.mutations.lock().await;
            let index = mutations
                .iter()
                .position(|m| m.id == id)
                .ok_or_else(|| SyncError::MutationNotFound(id.to_string()))?;
            let previous = mutations[index].clone();
            mutations[index].reset_for_retry()?;

            if let Err(e) = self.persist(&mutations).await {
                mutations[index] = previous;
                return Err(e.into());
            }
            self.notify(&mutations);
        }

        info!(id = %id, "Mutation retry requested");
        self.spawn_drain();
        Ok(())
    }

    /// Resets every `failed` record. Returns how many were reset.
    ///
    /// If the reset cannot be persisted, every record stays `failed` and the
    /// storage error is returned.
    pub async fn retry_all_failed(self: &Arc<Self>) -> SyncResult<usize> {
        let reset = {
            let mut mutations = self.mutations.lock().await;
            let mut previous = Vec::new();
            for (index, mutation) in mutations.iter_mut().enumerate() {
                if mutation.status == MutationStatus::Failed {
                    let before = mutation.clone();
                    if mutation.reset_for_retry().is_ok() {
                        previous.push((index, before));
                    }
                }
            }

            if !previous.is_empty() {
                if let Err(e) = self.persist(&mutations).await {
                    for (index, before) in previous {
                        mutations[index] = before;
                    }
                    return Err(e.into());
                }
                self.notify(&mutations);
            }
            previous.len()
        };

        if reset > 0 {
            info!(count = reset, "Failed mutations reset for retry");
            self.spawn_drain();
        }
        Ok(reset)
    }

    /// Deletes a record regardless of its status. `Ok(None)` for an unknown
    /// id.
    ///
    /// ## Errors
    /// `Storage` if the deletion could not be persisted. The record is kept,
    /// so it does not reappear after a restart.
    pub async fn remove(&self, id: &str) -> SyncResult<Option<PendingMutation>> {
        let mut mutations = self.mutations.lock().await;
        let Some(index) = mutations.iter().position(|m| m.id == id) else {
            return Ok(None);
        };
        let removed = mutations.remove(index);

        if let Err(e) = self.persist(&mutations).await {
            mutations.insert(index, removed);
            return Err(e.into());
        }
        self.notify(&mutations);

        info!(id = %id, status = %removed.status, "Mutation removed");
        Ok(Some(removed))
    }

    // =========================================================================
    // Drain
    // =========================================================================

    /// Runs one drain pass, unless one is already running or the device is
    /// offline.
    ///
    /// Per-record failures never abort the pass. Persistence failures are
    /// logged as they happen and the pass returns `SyncError::Storage` once
    /// it has finished.
    pub async fn drain(&self) -> SyncResult<DrainOutcome> {
        let Some(_flight) = self.flight.try_begin() else {
            debug!("Drain already running, skipping");
            return Ok(DrainOutcome::Skipped(SkipReason::AlreadyRunning));
        };

        if !self.connectivity.is_online() {
            debug!("Offline, skipping drain");
            return Ok(DrainOutcome::Skipped(SkipReason::Offline));
        }

        let max_attempts = self.settings.max_attempts;
        let mut report = DrainReport::default();
        let mut visited: HashSet<String> = HashSet::new();
        let mut storage_error: Option<StoreError> = None;

        loop {
            if !self.connectivity.is_online() {
                info!(attempted = report.attempted, "Connectivity lost, stopping drain");
                report.interrupted = true;
                break;
            }

            // 1. Claim the oldest eligible record not yet seen by this pass.
            let (id, payload, attachment) = {
                let mut mutations = self.mutations.lock().await;
                let next = mutations
                    .iter_mut()
                    .filter(|m| !visited.contains(&m.id) && m.is_eligible(max_attempts))
                    .min_by_key(|m| m.created_at);
                let Some(mutation) = next else {
                    break;
                };

                visited.insert(mutation.id.clone());
                mutation.begin_attempt(Utc::now())?;
                let claimed = (
                    mutation.id.clone(),
                    mutation.payload.clone(),
                    mutation.attachment.clone(),
                );

                if let Err(e) = self.commit(&mutations).await {
                    storage_error = Some(e);
                }
                claimed
            };

            debug!(id = %id, operation = %payload.operation(), "Uploading mutation");

            // 2. Remote I/O with no lock held.
            let outcome = self.upload(&payload, attachment.as_deref()).await;

            // 3. Record the outcome.
            {
                let mut mutations = self.mutations.lock().await;
                let Some(mutation) = mutations.iter_mut().find(|m| m.id == id) else {
                    debug!(id = %id, "Mutation removed during upload");
                    continue;
                };

                report.attempted += 1;
                match outcome {
                    Ok(remote_id) => {
                        info!(id = %id, remote_id = %remote_id, "Mutation delivered");
                        mutation.record_success(remote_id)?;
                        report.succeeded += 1;
                    }
                    Err(e) => {
                        let give_up = !e.is_retryable() && !self.settings.retry_permanent_errors;
                        let status = mutation.record_failure(e.to_string(), max_attempts, give_up)?;
                        if status == MutationStatus::Failed {
                            warn!(
                                id = %id,
                                attempts = mutation.attempt_count,
                                error = %e,
                                "Mutation failed, waiting for manual retry"
                            );
                            report.failed += 1;
                        } else {
                            debug!(
                                id = %id,
                                attempts = mutation.attempt_count,
                                error = %e,
                                "Upload failed, will retry"
                            );
                            report.requeued += 1;
                        }
                    }
                }

                if let Err(e) = self.commit(&mutations).await {
                    storage_error = Some(e);
                }
            }

            // 4. Pace the uploads.
            let delay = self.settings.inter_item_delay();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        report.pruned = self.prune_completed(&mut storage_error).await;

        if report.attempted > 0 || report.pruned > 0 {
            info!(
                attempted = report.attempted,
                succeeded = report.succeeded,
                requeued = report.requeued,
                failed = report.failed,
                pruned = report.pruned,
                "Drain pass finished"
            );
        }

        match storage_error {
            Some(e) => Err(SyncError::Storage(e)),
            None => Ok(DrainOutcome::Completed(report)),
        }
    }

    /// Spawns a detached drain pass.
    pub fn spawn_drain(self: &Arc<Self>) {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = queue.drain().await {
                error!(?e, "Background drain failed");
            }
        });
    }

    /// Drains every `interval` until `shutdown_rx` fires or its sender is
    /// dropped. The first pass runs one interval after the call.
    ///
    /// Shutdown also interrupts a pass waiting on the remote. The record it
    /// was uploading goes back to `pending`.
    pub async fn run_retry_loop(self: Arc<Self>, interval: Duration, mut shutdown_rx: mpsc::Receiver<()>) {
        info!(?interval, "Mutation retry loop starting");

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown_rx.recv() => break,
            }

            tokio::select! {
                outcome = self.drain() => match outcome {
                    Ok(DrainOutcome::Skipped(reason)) => {
                        debug!(?reason, "Periodic drain skipped");
                    }
                    Ok(DrainOutcome::Completed(_)) => {}
                    Err(e) => {
                        error!(?e, "Periodic drain failed");
                    }
                },
                _ = shutdown_rx.recv() => {
                    info!("Drain pass abandoned by shutdown");
                    self.release_abandoned().await;
                    break;
                }
            }
        }

        info!("Mutation retry loop stopped");
    }

    /// Returns `in_flight` records left by a cancelled pass to `pending`.
    async fn release_abandoned(&self) {
        let Some(_flight) = self.flight.try_begin() else {
            return;
        };

        let mut mutations = self.mutations.lock().await;
        let mut released = 0;
        for mutation in mutations.iter_mut() {
            if mutation.normalize_after_restart() {
                released += 1;
            }
        }

        if released > 0 {
            debug!(count = released, "Abandoned uploads returned to pending");
            let _ = self.commit(&mutations).await;
        }
    }

    async fn upload(&self, payload: &MutationPayload, attachment: Option<&[u8]>) -> Result<RemoteId, RemoteError> {
        let remote_id = self.remote.create(payload).await?;
        if let Some(bytes) = attachment {
            self.remote.upload_attachment(&remote_id, bytes).await?;
        }
        Ok(remote_id)
    }

    async fn prune_completed(&self, storage_error: &mut Option<StoreError>) -> usize {
        let retention = self.settings.retention();
        let now = Utc::now();

        let mut mutations = self.mutations.lock().await;
        let before = mutations.len();
        mutations.retain(|m| !m.is_prunable(retention, now));
        let pruned = before - mutations.len();

        if pruned > 0 {
            debug!(count = pruned, "Pruned completed mutations");
            if let Err(e) = self.commit(&mutations).await {
                *storage_error = Some(e);
            }
        }
        pruned
    }

    /// Persists `mutations`, then publishes the new counts even if the write
    /// failed.
    ///
    /// Called with the state lock held so persisted snapshots and events
    /// follow the in-memory order.
    async fn commit(&self, mutations: &[PendingMutation]) -> StoreResult<()> {
        let result = self.persist(mutations).await;
        self.notify(mutations);
        result
    }

    async fn persist(&self, mutations: &[PendingMutation]) -> StoreResult<()> {
        let result = self.records.save(mutations).await;
        if let Err(ref e) = result {
            error!(error = %e, "Failed to persist mutation queue");
        }
        result
    }

    fn notify(&self, mutations: &[PendingMutation]) {
        let (pending_count, failed_count) = counts(mutations);
        self.bus.publish(OfflineEvent::MutationQueueChanged {
            pending_count,
            failed_count,
        });
    }

    // =========================================================================
    // Read Accessors
    // =========================================================================

    /// `pending` plus `in_flight` records.
    pub async fn pending_count(&self) -> usize {
        counts(&self.mutations.lock().await).0
    }

    pub async fn failed_count(&self) -> usize {
        counts(&self.mutations.lock().await).1
    }

    /// Returns true while an upload is in progress.
    pub async fn has_uploading(&self) -> bool {
        self.mutations
            .lock()
            .await
            .iter()
            .any(|m| m.status == MutationStatus::InFlight)
    }

    pub async fn get(&self, id: &str) -> Option<PendingMutation> {
        self.mutations
            .lock()
            .await
            .iter()
            .find(|m| m.id == id)
            .cloned()
    }

    /// Owned copy of every record, in queue order.
    pub async fn snapshot(&self) -> Vec<PendingMutation> {
        self.mutations.lock().await.clone()
    }

    pub fn is_draining(&self) -> bool {
        self.flight.is_running()
    }
}

impl std::fmt::Debug for MutationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationQueue")
            .field("records", &self.records)
            .field("settings", &self.settings)
            .field("draining", &self.flight.is_running())
            .finish_non_exhaustive()
    }
}

fn counts(mutations: &[PendingMutation]) -> (usize, usize) {
    mutations.iter().fold((0, 0), |(pending, failed), m| match m.status {
        MutationStatus::Pending | MutationStatus::InFlight => (pending + 1, failed),
        MutationStatus::Failed => (pending, failed + 1),
        MutationStatus::Completed => (pending, failed),
    })
}
