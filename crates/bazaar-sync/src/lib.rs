//! # bazaar-sync: Offline Sync Layer for Bazaar Mobile
//!
//! Queues user writes while the device is offline, replays them once it is
//! back online, and keeps bounded caches of server data fresh.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Offline Runtime Architecture                      │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 OfflineRuntime (Main Orchestrator)               │  │
//! │  │                                                                  │  │
//! │  │  Built once by the host app, started after the store opens      │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ MutationQueue  │  │   SyncEngine   │  │       EventBus         │    │
//! │  │                │  │                │  │                        │    │
//! │  │ Persists writes│  │ Timer-driven   │  │ Typed broadcast of     │    │
//! │  │ Drains them in │  │ fetch of each  │  │ queue, progress and    │    │
//! │  │ createdAt order│  │ resource into  │  │ data-updated events    │    │
//! │  │ Retry budget   │  │ a BoundedCache │  │                        │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │         │                     │                                         │
//! │         └──────► RemoteApi ◄──┘        Connectivity (host oracle)      │
//! │                                                                         │
//! │  EVENTS (to the UI):                                                    │
//! │  • MutationQueueChanged - pending / failed badge counts                │
//! │  • SyncProgress         - initial and manual refresh steps             │
//! │  • DataUpdated          - cached data replaced                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`config`] - Offline configuration (queue, sync cadence, resources)
//! - [`engine`] - `SyncEngine` resource caches and refresh timer
//! - [`error`] - Sync and remote error types
//! - [`events`] - `EventBus` and subscriptions
//! - [`queue`] - `MutationQueue` and its drain pass
//! - [`remote`] - `RemoteApi` and `Connectivity` collaborator traits
//! - [`runtime`] - `OfflineRuntime` builder and lifecycle
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bazaar_sync::{OfflineConfig, OfflineRuntimeBuilder};
//!
//! let runtime = OfflineRuntimeBuilder::new(OfflineConfig::load_or_default(None))
//!     .with_storage(kv)
//!     .with_remote(api)
//!     .build()
//!     .await?;
//! runtime.start().await?;
//!
//! let id = runtime.queue().enqueue(payload, Some(photo)).await;
//! let status = runtime.status().await;
//! println!("Pending uploads: {}", status.pending_count);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod queue;
pub mod remote;
pub mod runtime;

mod flight;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{OfflineConfig, QueueSettings, ResourceSettings, SyncSettings};
pub use engine::{RefreshMode, RefreshOutcome, RefreshReport, ResourceFailure, SyncEngine};
pub use error::{RemoteError, SyncError, SyncResult};
pub use events::{DataScope, EventBus, OfflineEvent, Subscription};
pub use queue::{DrainOutcome, DrainReport, MutationQueue, SkipReason};
pub use remote::{Connectivity, RemoteApi, SharedConnectivity};
pub use runtime::{OfflineRuntime, OfflineRuntimeBuilder, RuntimeStatus};
