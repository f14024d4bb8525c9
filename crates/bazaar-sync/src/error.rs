//! # Sync Error Types
//!
//! Error types for queue, engine and runtime operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │     Remote      │  │        Queue            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  RemoteError    │  │  MutationNotFound       │ │
//! │  │  ConfigLoad...  │  │  (per record or │  │  Core (transition)      │ │
//! │  │  ConfigSave...  │  │   per resource) │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Storage      │  │     Engine      │  │       Runtime           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  StoreError     │  │  UnknownResource│  │  MissingComponent       │ │
//! │  │  (logged; user  │  │                 │  │  ShuttingDown           │ │
//! │  │   edits undone) │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use bazaar_core::CoreError;
use bazaar_store::StoreError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

// =============================================================================
// Remote Error
// =============================================================================

/// Failure reported by the remote API collaborator.
///
/// ## Classification
/// ```text
/// Transient (retryable)            Permanent (server rejected the request)
/// ─────────────────────            ───────────────────────────────────────
/// Network                          Rejected (4xx)
/// Timeout                          InvalidResponse
/// Server (5xx)
/// ```
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Request never reached the server (DNS, TLS, socket).
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// 5xx response.
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// 4xx response: validation failure, conflict, missing listing.
    #[error("Request rejected with {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The server answered with something the client cannot read.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Returns true if repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::Network(_) | RemoteError::Timeout(_) | RemoteError::Server { .. }
        )
    }
}

// =============================================================================
// Sync Error
// =============================================================================

/// Sync error type covering queue, engine and runtime failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid offline configuration.
    #[error("Invalid offline configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Queue Errors
    // =========================================================================
    /// No mutation with this id is queued.
    #[error("Mutation not found: {0}")]
    MutationNotFound(String),

    /// Domain rule violation (invalid transition, zero cache size, validation).
    #[error(transparent)]
    Core(#[from] CoreError),

    // =========================================================================
    // Engine Errors
    // =========================================================================
    /// The resource is not tracked by the engine.
    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    // =========================================================================
    // Collaborator Errors
    // =========================================================================
    /// Local storage failed. Upload progress stays in memory; a user edit
    /// (retry, remove) is undone so memory matches disk.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    // =========================================================================
    // Runtime Errors
    // =========================================================================
    /// A builder was finished without a required collaborator.
    #[error("Offline runtime is missing its {0}")]
    MissingComponent(&'static str),

    /// The runtime has been shut down.
    #[error("Offline runtime is shutting down")]
    ShuttingDown,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_classification() {
        assert!(RemoteError::Network("connection reset".into()).is_retryable());
        assert!(RemoteError::Timeout(30).is_retryable());
        assert!(RemoteError::Server {
            status: 503,
            message: "maintenance".into()
        }
        .is_retryable());

        assert!(!RemoteError::Rejected {
            status: 422,
            message: "price must be positive".into()
        }
        .is_retryable());
        assert!(!RemoteError::InvalidResponse("truncated body".into()).is_retryable());
    }

    #[test]
    fn test_storage_error_wrapped() {
        let err = SyncError::from(StoreError::QueryFailed("disk full".into()));
        assert!(matches!(err, SyncError::Storage(_)));
        assert!(err.to_string().starts_with("Storage error:"));
    }

    #[test]
    fn test_core_error_is_transparent() {
        let err = SyncError::from(CoreError::InvalidCacheSize(0));
        assert_eq!(
            err.to_string(),
            "Cache max size must be greater than zero, got 0"
        );
    }
}
