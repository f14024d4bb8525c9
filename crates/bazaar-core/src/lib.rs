//! # bazaar-core: Pure Domain Logic for the Bazaar Offline Layer
//!
//! This crate holds the parts of the offline layer that need no I/O: the
//! bounded cache, the pending-mutation state machine and listing validation.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Bazaar Offline Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   Mobile UI (React Native)                      │   │
//! │  │     Browse ──► Create listing ──► Upload status ──► Retry       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ FFI commands                           │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        bazaar-sync: MutationQueue, SyncEngine, EventBus         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ bazaar-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────────┐  ┌────────────────┐  ┌──────────────┐        │   │
//! │  │   │    cache     │  │     types      │  │  validation  │        │   │
//! │  │   │ BoundedCache │  │ PendingMutation│  │ ListingDraft │        │   │
//! │  │   │  LRU + TTL   │  │ state machine  │  │    rules     │        │   │
//! │  │   └──────────────┘  └────────────────┘  └──────────────┘        │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO STORAGE • NO NETWORK • NO TIMERS                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              bazaar-store (key-value storage)                   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`cache`] - Capacity-bounded LRU cache with per-entry TTL
//! - [`types`] - Pending mutations, payloads, listing drafts
//! - [`error`] - Domain error types
//! - [`validation`] - Listing draft rules
//!
//! ## Example Usage
//!
//! ```rust
//! use bazaar_core::BoundedCache;
//!
//! let mut cache = BoundedCache::new(2).unwrap();
//! cache.put("a", 1, None);
//! cache.put("b", 2, None);
//! cache.get(&"a");
//! cache.put("c", 3, None);
//!
//! // "b" was least recently used
//! assert!(!cache.contains_key(&"b"));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cache;
pub mod error;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cache::{BoundedCache, CacheStats};
pub use error::{CoreError, CoreResult, ValidationError};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Upload attempts a mutation gets before it is marked `failed`.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Largest attachment accepted for a listing (5 MiB).
pub const MAX_ATTACHMENT_BYTES: usize = 5 * 1024 * 1024;

pub const MAX_TITLE_LEN: usize = 120;

pub const MAX_DESCRIPTION_LEN: usize = 4_000;

/// Upper bound on an asking price: 10 million in major units.
pub const MAX_PRICE_CENTS: i64 = 1_000_000_000;
