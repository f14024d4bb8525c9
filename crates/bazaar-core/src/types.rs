//! # Domain Types
//!
//! Core domain types for the Bazaar offline layer.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌───────────────────┐   ┌───────────────────┐   ┌─────────────────┐   │
//! │  │ PendingMutation   │   │ MutationPayload   │   │  ListingDraft   │   │
//! │  │  ───────────────  │   │  ───────────────  │   │  ─────────────  │   │
//! │  │  id (UUID)        │──►│  CreateListing    │──►│  title          │   │
//! │  │  status           │   │  UpdateListing    │   │  price_cents    │   │
//! │  │  attempt_count    │   │  Custom           │   │  currency       │   │
//! │  │  attachment (b64) │   └───────────────────┘   └─────────────────┘   │
//! │  └───────────────────┘                                                  │
//! │                                                                         │
//! │  MutationStatus state machine:                                         │
//! │                                                                         │
//! │    pending ──begin──► in_flight ──success──► completed                 │
//! │       ▲                   │                                             │
//! │       │◄──failure (budget left)                                         │
//! │       │                   └──failure (budget spent)──► failed          │
//! │       └────────────────── retry ◄──────────────────────┘               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Attempt Budget
//! `attempt_count` never decreases. A manual retry stores the current count
//! in `retry_baseline`, so the budget check is
//! `attempt_count - retry_baseline < max_attempts`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Mutation Status
// =============================================================================

/// Delivery status of a queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MutationStatus {
    /// Waiting for the next drain pass.
    Pending,
    /// Upload in progress. Only observable inside a single drain pass.
    InFlight,
    /// Delivered to the server.
    Completed,
    /// Attempt budget exhausted. Needs a manual retry.
    Failed,
}

impl MutationStatus {
    /// Returns true for records that still count towards the pending badge.
    pub fn is_active(&self) -> bool {
        matches!(self, MutationStatus::Pending | MutationStatus::InFlight)
    }
}

impl std::fmt::Display for MutationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationStatus::Pending => write!(f, "pending"),
            MutationStatus::InFlight => write!(f, "in_flight"),
            MutationStatus::Completed => write!(f, "completed"),
            MutationStatus::Failed => write!(f, "failed"),
        }
    }
}

// =============================================================================
// Remote Id
// =============================================================================

/// Identifier assigned by the server to a created resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    pub fn new(id: impl Into<String>) -> Self {
        RemoteId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RemoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Listing Draft
// =============================================================================

/// Fields of a marketplace listing as typed by the seller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ListingDraft {
    pub title: String,

    #[serde(default)]
    pub description: String,

    /// Asking price in minor units (cents).
    pub price_cents: i64,

    /// ISO 4217 currency code, e.g. "USD".
    pub currency: String,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub location: Option<String>,
}

// =============================================================================
// Mutation Payload
// =============================================================================

/// The domain operation a queued mutation replays against the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationPayload {
    /// Create a new listing.
    CreateListing { draft: ListingDraft },

    /// Replace the fields of an existing listing.
    UpdateListing {
        #[serde(rename = "listingId")]
        listing_id: String,
        draft: ListingDraft,
    },

    /// Any other write the UI wants replayed (favourites, reports, ...).
    Custom {
        operation: String,
        #[ts(type = "unknown")]
        body: serde_json::Value,
    },
}

impl MutationPayload {
    /// Short operation name used in log lines.
    pub fn operation(&self) -> &str {
        match self {
            MutationPayload::CreateListing { .. } => "create_listing",
            MutationPayload::UpdateListing { .. } => "update_listing",
            MutationPayload::Custom { operation, .. } => operation,
        }
    }
}

// =============================================================================
// Pending Mutation
// =============================================================================

/// A user-initiated write waiting for delivery to the server.
///
/// ## Persisted Layout
/// ```json
/// {
///   "id": "1b4e28ba-2fa1-11d2-883f-0016d3cca427",
///   "payload": { "kind": "create_listing", "draft": { ... } },
///   "attachment": "iVBORw0KGgo..." ,
///   "createdAt": "2026-10-17T08:00:00Z",
///   "lastAttemptAt": "2026-10-17T08:00:00Z",
///   "attemptCount": 0,
///   "status": "pending",
///   "errorMessage": null
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PendingMutation {
    /// Unique identifier (UUID v4), minted at enqueue time.
    pub id: String,

    pub payload: MutationPayload,

    /// Optional binary attachment (e.g. the listing photo).
    #[serde(default, with = "attachment_base64")]
    #[ts(type = "string | null")]
    pub attachment: Option<Vec<u8>>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    /// Start of the most recent attempt. Equals `created_at` until then.
    #[ts(as = "String")]
    pub last_attempt_at: DateTime<Utc>,

    pub attempt_count: u32,

    pub status: MutationStatus,

    /// Set only when the most recent attempt failed.
    #[serde(default)]
    pub error_message: Option<String>,

    /// Server id returned by a successful create.
    #[serde(default)]
    pub remote_id: Option<RemoteId>,

    /// `attempt_count` at the last manual retry.
    #[serde(default)]
    pub retry_baseline: u32,
}

impl PendingMutation {
    /// Builds a fresh `pending` record.
    pub fn new(payload: MutationPayload, attachment: Option<Vec<u8>>, now: DateTime<Utc>) -> Self {
        PendingMutation {
            id: Uuid::new_v4().to_string(),
            payload,
            attachment,
            created_at: now,
            last_attempt_at: now,
            attempt_count: 0,
            status: MutationStatus::Pending,
            error_message: None,
            remote_id: None,
            retry_baseline: 0,
        }
    }

    /// Attempts made since creation or the last manual retry.
    pub fn attempts_since_retry(&self) -> u32 {
        self.attempt_count.saturating_sub(self.retry_baseline)
    }

    /// Returns true if a drain pass may attempt this record.
    pub fn is_eligible(&self, max_attempts: u32) -> bool {
        self.status == MutationStatus::Pending && self.attempts_since_retry() < max_attempts
    }

    /// `pending → in_flight`. Bumps `last_attempt_at`, never below `created_at`.
    pub fn begin_attempt(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        if self.status != MutationStatus::Pending {
            return Err(CoreError::invalid_transition(&self.id, self.status, "begin an attempt"));
        }
        self.status = MutationStatus::InFlight;
        self.last_attempt_at = now.max(self.created_at);
        Ok(())
    }

    /// `in_flight → completed`.
    pub fn record_success(&mut self, remote_id: RemoteId) -> CoreResult<()> {
        if self.status != MutationStatus::InFlight {
            return Err(CoreError::invalid_transition(&self.id, self.status, "complete"));
        }
        self.attempt_count += 1;
        self.status = MutationStatus::Completed;
        self.error_message = None;
        self.remote_id = Some(remote_id);
        Ok(())
    }

    /// `in_flight → pending | failed`.
    ///
    /// `give_up` forces `failed` regardless of the remaining budget (used for
    /// permanent remote errors when they are configured not to be retried).
    pub fn record_failure(
        &mut self,
        message: impl Into<String>,
        max_attempts: u32,
        give_up: bool,
    ) -> CoreResult<MutationStatus> {
        if self.status != MutationStatus::InFlight {
            return Err(CoreError::invalid_transition(&self.id, self.status, "record a failure"));
        }
        self.attempt_count += 1;
        self.error_message = Some(message.into());
        self.status = if give_up || self.attempts_since_retry() >= max_attempts {
            MutationStatus::Failed
        } else {
            MutationStatus::Pending
        };
        Ok(self.status)
    }

    /// `failed → pending` with a fresh attempt budget.
    pub fn reset_for_retry(&mut self) -> CoreResult<()> {
        if self.status != MutationStatus::Failed {
            return Err(CoreError::invalid_transition(&self.id, self.status, "retry"));
        }
        self.status = MutationStatus::Pending;
        self.error_message = None;
        self.retry_baseline = self.attempt_count;
        Ok(())
    }

    /// Rewrites an `in_flight` record loaded after a restart back to `pending`.
    ///
    /// Returns true if the record was changed.
    pub fn normalize_after_restart(&mut self) -> bool {
        if self.status == MutationStatus::InFlight {
            self.status = MutationStatus::Pending;
            true
        } else {
            false
        }
    }

    /// Returns true for `completed` records older than the retention window.
    pub fn is_prunable(&self, retention: Duration, now: DateTime<Utc>) -> bool {
        self.status == MutationStatus::Completed && now - self.last_attempt_at > retention
    }
}

// =============================================================================
// Resource Item
// =============================================================================

/// One keyed record of a server resource (a listing, a category, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ResourceItem {
    pub key: String,
    #[ts(type = "unknown")]
    pub data: serde_json::Value,
}

impl ResourceItem {
    pub fn new(key: impl Into<String>, data: serde_json::Value) -> Self {
        ResourceItem {
            key: key.into(),
            data,
        }
    }
}

// =============================================================================
// Attachment encoding
// =============================================================================

/// Serde adapter: `Option<Vec<u8>>` ⇄ base64 string or `null`.
pub mod attachment_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom))
            .transpose()
    }
}
