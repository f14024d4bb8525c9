//! # Sync Commands
//!
//! Offline status, cache reads and refresh control.
//!
//! ## Command Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Commands                                    │
//! │                                                                         │
//! │  get_offline_status()        - pending/failed counts, online, refresh  │
//! │  force_refresh()             - refresh every resource now              │
//! │  get_cached_items(resource)  - cached items, never hits the network    │
//! │  get_cache_stats(resource)   - hit rate and size of one cache          │
//! │  set_online(online)          - OS reachability callback                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;

use bazaar_core::{CacheStats, ResourceItem};
use bazaar_sync::{RefreshOutcome, RuntimeStatus};

use crate::error::ApiError;
use crate::MobileCore;

/// Returns the status shown in the offline banner.
pub async fn get_offline_status(core: &MobileCore) -> Result<RuntimeStatus, ApiError> {
    Ok(core.runtime().status().await)
}

/// A resource whose refresh failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshFailureDto {
    pub resource: String,
    pub message: String,
    pub retryable: bool,
}

/// Result of a manual refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSummaryDto {
    /// Another refresh was already running.
    pub skipped: bool,
    pub refreshed: Vec<String>,
    pub failed: Vec<RefreshFailureDto>,
}

/// Refreshes every resource now. Progress arrives as `SyncProgress` events.
pub async fn force_refresh(core: &MobileCore) -> Result<RefreshSummaryDto, ApiError> {
    let summary = match core.runtime().engine().force_refresh_now().await {
        RefreshOutcome::Skipped => RefreshSummaryDto {
            skipped: true,
            refreshed: Vec::new(),
            failed: Vec::new(),
        },
        RefreshOutcome::Completed(report) => RefreshSummaryDto {
            skipped: false,
            refreshed: report.refreshed,
            failed: report
                .errors
                .into_iter()
                .map(|failure| RefreshFailureDto {
                    resource: failure.resource,
                    message: failure.error.to_string(),
                    retryable: failure.error.is_retryable(),
                })
                .collect(),
        },
    };
    Ok(summary)
}

/// Cached items of `resource`, most recently used first.
pub async fn get_cached_items(core: &MobileCore, resource: String) -> Result<Vec<ResourceItem>, ApiError> {
    Ok(core.runtime().engine().items(&resource).await?)
}

pub async fn get_cache_stats(core: &MobileCore, resource: String) -> Result<CacheStats, ApiError> {
    Ok(core.runtime().engine().cache_stats(&resource).await?)
}

/// Records an OS reachability change. Going online starts an upload pass.
pub async fn set_online(core: &MobileCore, online: bool) -> Result<RuntimeStatus, ApiError> {
    core.connectivity().set_online(online);
    core.runtime().connectivity_changed(online);
    Ok(core.runtime().status().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::testing::{self, eventually};

    #[tokio::test]
    async fn test_refresh_then_read_cache() {
        let t = testing::start(5, true).await;

        let summary = force_refresh(&t.core).await.unwrap();
        if !summary.skipped {
            assert_eq!(summary.refreshed, vec!["listings"]);
            assert!(summary.failed.is_empty());
        }

        let core = &t.core;
        let cached = eventually(|| async move {
            get_cached_items(core, "listings".into()).await.unwrap().len() == 1
        })
        .await;
        assert!(cached);

        let items = get_cached_items(&t.core, "listings".into()).await.unwrap();
        assert_eq!(items[0].key, "listings-1");
        assert_eq!(get_cache_stats(&t.core, "listings".into()).await.unwrap().max_size, 20);

        let status = get_offline_status(&t.core).await.unwrap();
        assert!(status.last_refresh.is_some());
        assert!(status.is_online);

        t.core.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_resource() {
        let t = testing::start(5, true).await;
        let err = get_cached_items(&t.core, "reviews".into()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
        t.core.shutdown().await;
    }

    #[tokio::test]
    async fn test_set_online_reflected_in_status() {
        let t = testing::start(5, true).await;

        let status = set_online(&t.core, false).await.unwrap();
        assert!(!status.is_online);
        assert_eq!(status.pending_count, 0);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["isOnline"], false);
        assert!(json.get("pendingCount").is_some());

        assert!(set_online(&t.core, true).await.unwrap().is_online);
        t.core.shutdown().await;
    }
}
