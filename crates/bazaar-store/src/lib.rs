//! # bazaar-store: Storage Layer for the Bazaar Offline Layer
//!
//! Durable key-value storage plus the typed records the offline layer keeps
//! in it.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Bazaar Offline Data Flow                         │
//! │                                                                         │
//! │  MutationQueue.enqueue / SyncEngine.refresh_all                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   bazaar-store (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────────┐  ┌────────────┐  │   │
//! │  │   │  SqliteStore  │    │    Repositories    │  │ Migrations │  │   │
//! │  │   │  (pool.rs)    │◄───│ MutationRecordStore│  │ (embedded) │  │   │
//! │  │   │  MemoryStore  │    │ SnapshotStore      │  │ 001_kv.sql │  │   │
//! │  │   │  (kv.rs)      │    │                    │  │            │  │   │
//! │  │   └───────────────┘    └────────────────────┘  └────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  <app data dir>/bazaar.db                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use bazaar_store::{MutationRecordStore, SqliteStore, StoreConfig};
//!
//! let kv = Arc::new(SqliteStore::new(StoreConfig::new("bazaar.db")).await?);
//! let records = MutationRecordStore::new(kv, "offline.mutation_queue");
//! let pending = records.load().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod kv;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{StoreError, StoreResult};
pub use kv::{KeyValueStore, MemoryStore};
pub use pool::{SqliteStore, StoreConfig};

pub use repository::mutations::MutationRecordStore;
pub use repository::snapshots::{ResourceSnapshot, SnapshotStore};
