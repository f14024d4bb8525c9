//! # Mutation Commands
//!
//! Listing writes and management of the upload queue.
//!
//! ```text
//! create_listing(draft, photo?)   - validate, then queue for upload
//! update_listing(id, draft, ...)  - validate, then queue for upload
//! retry_mutation(id)              - failed upload back to pending
//! retry_all_failed()              - every failed upload back to pending
//! remove_mutation(id)             - drop a queued upload
//! list_mutations()                - queue contents for the uploads screen
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use bazaar_core::validation::{validate_attachment, validate_listing_draft};
use bazaar_core::{ListingDraft, MutationPayload, MutationStatus, PendingMutation};

use crate::error::ApiError;
use crate::MobileCore;

/// One queued upload as shown in the UI. Attachment bytes stay in Rust.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationDto {
    pub id: String,
    pub operation: String,
    pub status: MutationStatus,
    pub attempt_count: u32,
    pub error_message: Option<String>,
    pub remote_id: Option<String>,
    pub has_attachment: bool,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
}

impl From<&PendingMutation> for MutationDto {
    fn from(m: &PendingMutation) -> Self {
        MutationDto {
            id: m.id.clone(),
            operation: m.payload.operation().to_string(),
            status: m.status,
            attempt_count: m.attempt_count,
            error_message: m.error_message.clone(),
            remote_id: m.remote_id.as_ref().map(|r| r.to_string()),
            has_attachment: m.attachment.is_some(),
            created_at: m.created_at,
            last_attempt_at: m.last_attempt_at,
        }
    }
}

/// Validates a new listing and queues it for upload.
///
/// # Returns
/// The id of the queued mutation. The upload happens in the background.
pub async fn create_listing(
    core: &MobileCore,
    draft: ListingDraft,
    attachment: Option<Vec<u8>>,
) -> Result<String, ApiError> {
    validate_listing_draft(&draft)?;
    if let Some(bytes) = &attachment {
        validate_attachment(bytes)?;
    }

    let id = core
        .runtime()
        .queue()
        .enqueue(MutationPayload::CreateListing { draft }, attachment)
        .await;
    Ok(id)
}

/// Validates edited listing fields and queues the update.
pub async fn update_listing(
    core: &MobileCore,
    listing_id: String,
    draft: ListingDraft,
    attachment: Option<Vec<u8>>,
) -> Result<String, ApiError> {
    if listing_id.trim().is_empty() {
        return Err(ApiError::validation("listing id is required"));
    }
    validate_listing_draft(&draft)?;
    if let Some(bytes) = &attachment {
        validate_attachment(bytes)?;
    }

    let id = core
        .runtime()
        .queue()
        .enqueue(MutationPayload::UpdateListing { listing_id, draft }, attachment)
        .await;
    Ok(id)
}

/// Moves a failed upload back to pending and starts a drain.
pub async fn retry_mutation(core: &MobileCore, id: String) -> Result<MutationDto, ApiError> {
    let queue = core.runtime().queue();
    queue.retry(&id).await?;

    let mutation = queue
        .get(&id)
        .await
        .ok_or_else(|| ApiError::not_found("Mutation", &id))?;
    Ok(MutationDto::from(&mutation))
}

/// Retries every failed upload.
///
/// # Returns
/// How many uploads were reset.
pub async fn retry_all_failed(core: &MobileCore) -> Result<usize, ApiError> {
    Ok(core.runtime().queue().retry_all_failed().await?)
}

/// Drops a queued upload whatever its status.
///
/// A `STORAGE_ERROR` means the upload is still queued.
pub async fn remove_mutation(core: &MobileCore, id: String) -> Result<MutationDto, ApiError> {
    let removed = core
        .runtime()
        .queue()
        .remove(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Mutation", &id))?;

    info!(id = %id, "Mutation removed by user");
    Ok(MutationDto::from(&removed))
}

/// Queue contents, oldest first.
pub async fn list_mutations(core: &MobileCore) -> Result<Vec<MutationDto>, ApiError> {
    let mut mutations = core.runtime().queue().snapshot().await;
    mutations.sort_by_key(|m| m.created_at);
    Ok(mutations.iter().map(MutationDto::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::sync::set_online;
    use crate::error::ErrorCode;
    use crate::testing::{self, eventually};
    use std::sync::atomic::Ordering;

    fn draft(title: &str) -> ListingDraft {
        ListingDraft {
            title: title.to_string(),
            description: "Good condition".to_string(),
            price_cents: 8_500,
            currency: "USD".to_string(),
            category: Some("furniture".to_string()),
            location: None,
        }
    }

    #[tokio::test]
    async fn test_create_listing_offline_then_online() {
        let t = testing::start(5, false).await;

        let id = create_listing(&t.core, draft("Oak table"), Some(vec![1, 2, 3]))
            .await
            .unwrap();

        let listed = list_mutations(&t.core).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
        assert_eq!(listed[0].status, MutationStatus::Pending);
        assert!(listed[0].has_attachment);

        set_online(&t.core, true).await.unwrap();
        let core = &t.core;
        let delivered = eventually(|| async move {
            list_mutations(core).await.unwrap()[0].status == MutationStatus::Completed
        })
        .await;
        assert!(delivered);
        assert!(list_mutations(&t.core).await.unwrap()[0].remote_id.is_some());

        t.core.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_draft_rejected_before_queueing() {
        let t = testing::start(5, false).await;

        let err = create_listing(&t.core, draft("   "), None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);

        let err = update_listing(&t.core, String::new(), draft("Chair"), None)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);

        assert!(list_mutations(&t.core).await.unwrap().is_empty());
        t.core.shutdown().await;
    }

    #[tokio::test]
    async fn test_retry_and_remove() {
        let t = testing::start(1, true).await;
        t.remote.failing.store(true, Ordering::SeqCst);

        let id = create_listing(&t.core, draft("Lamp"), None).await.unwrap();
        let core = &t.core;
        let failed = eventually(|| async move {
            list_mutations(core).await.unwrap()[0].status == MutationStatus::Failed
        })
        .await;
        assert!(failed);

        set_online(&t.core, false).await.unwrap();
        let err = retry_mutation(&t.core, "missing".into()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);

        let retried = retry_mutation(&t.core, id.clone()).await.unwrap();
        assert_eq!(retried.status, MutationStatus::Pending);
        assert!(retried.error_message.is_none());

        let err = retry_mutation(&t.core, id.clone()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidState);

        let removed = remove_mutation(&t.core, id.clone()).await.unwrap();
        assert_eq!(removed.id, id);
        assert_eq!(
            remove_mutation(&t.core, id).await.unwrap_err().code,
            ErrorCode::NotFound
        );

        t.core.shutdown().await;
    }

    #[tokio::test]
    async fn test_update_listing_queued() {
        let t = testing::start(5, false).await;
        update_listing(&t.core, "lst_9".into(), draft("Sofa"), None)
            .await
            .unwrap();

        let listed = list_mutations(&t.core).await.unwrap();
        assert_eq!(listed[0].operation, "update_listing");
        assert_eq!(retry_all_failed(&t.core).await.unwrap(), 0);

        t.core.shutdown().await;
    }
}
