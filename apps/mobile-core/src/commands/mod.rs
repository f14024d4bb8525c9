//! # Commands Module
//!
//! All commands exposed to the native shells.
//!
//! ## Command Organization
//! ```text
//! commands/
//! ├── mod.rs        ◄─── You are here (exports)
//! ├── mutations.rs  ◄─── create/update listing, retry, remove, list
//! └── sync.rs       ◄─── offline status, refresh, cached reads, connectivity
//! ```
//!
//! ## How Commands Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Command Flow                                         │
//! │                                                                         │
//! │  Swift / Kotlin                                                         │
//! │  ──────────────                                                         │
//! │  let id = try await core.createListing(draft, photo)                    │
//! │         │                                                               │
//! │         │ (bridge, JSON-friendly arguments)                             │
//! │         ▼                                                               │
//! │  Rust                                                                   │
//! │  ────                                                                   │
//! │  pub async fn create_listing(                                           │
//! │      core: &MobileCore,          ◄── Handle held by the shell          │
//! │      draft: ListingDraft,        ◄── From the form                     │
//! │      attachment: Option<Vec<u8>> ◄── Optional photo                    │
//! │  ) -> Result<String, ApiError>                                          │
//! │         │                                                               │
//! │         │ (serde serialization)                                         │
//! │         ▼                                                               │
//! │  Shell receives: mutation id, or { code, message }                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod mutations;
pub mod sync;
