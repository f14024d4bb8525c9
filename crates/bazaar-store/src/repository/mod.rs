//! # Repository Module
//!
//! Typed records on top of the key-value primitive.
//!
//! ```text
//! MutationQueue ──► MutationRecordStore ──┐
//!                                          ├──► Arc<dyn KeyValueStore>
//! SyncEngine    ──► SnapshotStore ────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`MutationRecordStore`] - Versioned envelope of pending mutations
//! - [`SnapshotStore`] - Last fetched items per cached resource

pub mod mutations;
pub mod snapshots;

pub use mutations::{MutationRecordStore, DEFAULT_MUTATION_KEY, MUTATION_SCHEMA_VERSION};
pub use snapshots::{ResourceSnapshot, SnapshotStore};
