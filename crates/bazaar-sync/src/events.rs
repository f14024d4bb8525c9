//! # Event Bus
//!
//! Typed change notifications from the queue and the engine to UI observers.
//!
//! ## Delivery Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  MutationQueue ──┐                        ┌──► Subscription (upload UI) │
//! │                  ├──► broadcast::Sender ──┼──► Subscription (feed UI)   │
//! │  SyncEngine ─────┘    (capacity N)        └──► Subscription (badge)     │
//! │                                                                         │
//! │  • at-most-once per publish to each CURRENT subscriber, no replay      │
//! │  • a subscriber more than N events behind skips the gap (warned)       │
//! │  • close() drops the sender: buffered events drain, then recv → None   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};

// =============================================================================
// Events
// =============================================================================

/// What a `DataUpdated` event refers to. Serialized as `"all"` or the
/// resource name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DataScope {
    All,
    Resource(String),
}

impl From<String> for DataScope {
    fn from(value: String) -> Self {
        if value == "all" {
            DataScope::All
        } else {
            DataScope::Resource(value)
        }
    }
}

impl From<DataScope> for String {
    fn from(scope: DataScope) -> Self {
        match scope {
            DataScope::All => "all".to_string(),
            DataScope::Resource(name) => name,
        }
    }
}

/// Notification delivered to UI observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OfflineEvent {
    /// The mutation list changed (persisted before this is published).
    #[serde(rename_all = "camelCase")]
    MutationQueueChanged {
        /// `pending` plus `in_flight` records.
        pending_count: usize,
        failed_count: usize,
    },

    /// One step of an initial or manual refresh.
    #[serde(rename_all = "camelCase")]
    SyncProgress {
        step: usize,
        total_steps: usize,
        message: String,
        is_complete: bool,
        has_error: bool,
    },

    /// Cached data was replaced.
    DataUpdated { scope: DataScope },
}

// =============================================================================
// Event Bus
// =============================================================================

/// Broadcast channel with an explicit close.
#[derive(Debug)]
pub struct EventBus {
    sender: RwLock<Option<broadcast::Sender<OfflineEvent>>>,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per subscriber.
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        EventBus {
            sender: RwLock::new(Some(sender)),
        }
    }

    /// Subscribes to events published from now on.
    ///
    /// Subscribing to a closed bus yields a subscription that is already
    /// finished.
    pub fn subscribe(&self) -> Subscription {
        let receiver = match self.read().as_ref() {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = broadcast::channel(1);
                drop(sender);
                receiver
            }
        };
        Subscription { receiver }
    }

    /// Publishes `event` and returns how many subscribers it reached.
    pub fn publish(&self, event: OfflineEvent) -> usize {
        match self.read().as_ref() {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => {
                debug!(?event, "Dropping event published after close");
                0
            }
        }
    }

    /// Closes the bus. Idempotent.
    pub fn close(&self) {
        if self.write().take().is_some() {
            debug!("Event bus closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.read().is_none()
    }

    pub fn subscriber_count(&self) -> usize {
        self.read()
            .as_ref()
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    // A poisoned lock only means a publisher panicked mid-send; the
    // Option inside is still valid.
    fn read(&self) -> RwLockReadGuard<'_, Option<broadcast::Sender<OfflineEvent>>> {
        self.sender.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<broadcast::Sender<OfflineEvent>>> {
        self.sender.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Receiving half of one observer.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<OfflineEvent>,
}

impl Subscription {
    /// Waits for the next event. Returns `None` once the bus is closed and
    /// every buffered event has been received.
    pub async fn recv(&mut self) -> Option<OfflineEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagged, skipping missed events");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<OfflineEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagged, skipping missed events");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Stops receiving. Equivalent to dropping the subscription.
    pub fn unsubscribe(self) {}

    /// Converts the subscription into a stream of events (lag gaps skipped).
    pub fn into_stream(self) -> impl Stream<Item = OfflineEvent> + Send + Unpin {
        BroadcastStream::new(self.receiver).filter_map(|item| match item {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(error = %e, "Event stream lagged");
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_changed(pending: usize) -> OfflineEvent {
        OfflineEvent::MutationQueueChanged {
            pending_count: pending,
            failed_count: 0,
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(8);
        assert_eq!(bus.publish(queue_changed(1)), 0);
    }

    #[tokio::test]
    async fn test_fan_out() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        assert_eq!(bus.publish(queue_changed(3)), 2);
        assert_eq!(a.recv().await, Some(queue_changed(3)));
        assert_eq!(b.recv().await, Some(queue_changed(3)));

        b.unsubscribe();
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(bus.publish(queue_changed(4)), 1);
    }

    #[tokio::test]
    async fn test_no_replay_for_late_subscribers() {
        let bus = EventBus::new(8);
        let _early = bus.subscribe();
        bus.publish(queue_changed(1));

        let mut late = bus.subscribe();
        assert_eq!(late.try_recv(), None);
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let bus = EventBus::new(8);
        let mut sub = bus.subscribe();
        bus.publish(queue_changed(1));

        bus.close();
        bus.close();
        assert!(bus.is_closed());
        assert_eq!(bus.publish(queue_changed(2)), 0);

        assert_eq!(sub.recv().await, Some(queue_changed(1)));
        assert_eq!(sub.recv().await, None);

        let mut after = bus.subscribe();
        assert_eq!(after.recv().await, None);
    }

    #[tokio::test]
    async fn test_lagged_subscriber_skips_gap() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();
        for n in 0..5 {
            bus.publish(queue_changed(n));
        }

        assert_eq!(sub.recv().await, Some(queue_changed(3)));
        assert_eq!(sub.recv().await, Some(queue_changed(4)));
        assert_eq!(sub.try_recv(), None);
    }

    #[tokio::test]
    async fn test_into_stream() {
        let bus = EventBus::new(8);
        let mut stream = bus.subscribe().into_stream();

        bus.publish(OfflineEvent::DataUpdated {
            scope: DataScope::Resource("listings".into()),
        });
        bus.close();

        assert_eq!(
            stream.next().await,
            Some(OfflineEvent::DataUpdated {
                scope: DataScope::Resource("listings".into())
            })
        );
        assert_eq!(stream.next().await, None);
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(queue_changed(2)).unwrap();
        assert_eq!(json["type"], "MutationQueueChanged");
        assert_eq!(json["pendingCount"], 2);
        assert_eq!(json["failedCount"], 0);

        let json = serde_json::to_value(OfflineEvent::DataUpdated {
            scope: DataScope::All,
        })
        .unwrap();
        assert_eq!(json["scope"], "all");

        let json = serde_json::to_value(OfflineEvent::SyncProgress {
            step: 1,
            total_steps: 4,
            message: "Refreshing listings".into(),
            is_complete: false,
            has_error: false,
        })
        .unwrap();
        assert_eq!(json["totalSteps"], 4);
        assert_eq!(json["isComplete"], false);
    }
}
