//! # API Error Type
//!
//! Unified error type for host commands.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Bazaar Mobile                          │
//! │                                                                         │
//! │  Swift / Kotlin shell          Rust core                                │
//! │  ────────────────────          ─────────                                │
//! │                                                                         │
//! │  core.createListing(draft)                                              │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Command Function                                                │  │
//! │  │  Result<T, ApiError>                                             │  │
//! │  │         │                                                        │  │
//! │  │  Validation Error? ── ValidationError::TooLong ─────┐            │  │
//! │  │         │                                           ▼            │  │
//! │  │  Queue Error? ─────── SyncError::MutationNotFound ─ ApiError ───►│  │
//! │  │         │                                                        │  │
//! │  │  Success ───────────────────────────────────────────────────────►│  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  { "code": "VALIDATION_ERROR", "message": "title is required" }        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use thiserror::Error;

use bazaar_core::{CoreError, ValidationError};
use bazaar_store::StoreError;
use bazaar_sync::SyncError;

/// API error returned from host commands.
///
/// ## Serialization
/// ```json
/// {
///   "code": "NOT_FOUND",
///   "message": "Mutation not found: 1b4e28ba-..."
/// }
/// ```
#[derive(Debug, Clone, Error, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("[{code:?}] {message}")]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,
}

/// Error codes for command responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Unknown mutation or resource
    NotFound,

    /// Input validation failed
    ValidationError,

    /// The record's status does not allow the operation
    InvalidState,

    /// Local storage failed
    StorageError,

    /// Configuration is invalid or unreadable
    ConfigError,

    /// The offline layer is shutting down
    Unavailable,

    /// Internal error
    Internal,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(resource: &str, id: &str) -> Self {
        ApiError::new(ErrorCode::NotFound, format!("{resource} not found: {id}"))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Internal, message)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::validation(err.to_string())
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => e.into(),
            CoreError::InvalidTransition { .. } => {
                ApiError::new(ErrorCode::InvalidState, err.to_string())
            }
            CoreError::InvalidCacheSize(_) => ApiError::new(ErrorCode::ConfigError, err.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        // Log the actual error but return a generic message
        tracing::error!(error = %err, "Storage operation failed");
        match err {
            StoreError::ConnectionFailed(_) => {
                ApiError::new(ErrorCode::StorageError, "Storage connection failed")
            }
            StoreError::MigrationFailed(_) => {
                ApiError::new(ErrorCode::StorageError, "Storage migration failed")
            }
            StoreError::PoolExhausted => {
                ApiError::new(ErrorCode::StorageError, "Storage pool exhausted")
            }
            _ => ApiError::new(ErrorCode::StorageError, "Storage operation failed"),
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::MutationNotFound(id) => ApiError::not_found("Mutation", &id),
            SyncError::UnknownResource(name) => ApiError::not_found("Resource", &name),
            SyncError::Core(e) => e.into(),
            SyncError::Storage(e) => e.into(),
            SyncError::InvalidConfig(_)
            | SyncError::ConfigLoadFailed(_)
            | SyncError::ConfigSaveFailed(_) => {
                ApiError::new(ErrorCode::ConfigError, err.to_string())
            }
            SyncError::ShuttingDown => ApiError::new(ErrorCode::Unavailable, err.to_string()),
            SyncError::MissingComponent(_) => {
                tracing::error!(error = %err, "Offline runtime misconfigured");
                ApiError::internal(err.to_string())
            }
        }
    }
}

/// Failure while bringing the mobile core up.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("Could not determine app data directory")]
    NoDataDir,

    #[error("Failed to prepare data directory: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_core::MutationStatus;

    #[test]
    fn test_serialized_shape() {
        let err = ApiError::not_found("Mutation", "m-1");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "NOT_FOUND");
        assert_eq!(json["message"], "Mutation not found: m-1");
    }

    #[test]
    fn test_sync_error_mapping() {
        let err: ApiError = SyncError::Core(CoreError::invalid_transition(
            "m-1",
            MutationStatus::Pending,
            "retry",
        ))
        .into();
        assert_eq!(err.code, ErrorCode::InvalidState);

        let err: ApiError = SyncError::UnknownResource("reviews".into()).into();
        assert_eq!(err.code, ErrorCode::NotFound);

        let err: ApiError = SyncError::ShuttingDown.into();
        assert_eq!(err.code, ErrorCode::Unavailable);
    }

    #[test]
    fn test_storage_details_hidden() {
        let err: ApiError = StoreError::QueryFailed("disk I/O error at page 42".into()).into();
        assert_eq!(err.code, ErrorCode::StorageError);
        assert!(!err.message.contains("page 42"));
    }
}
