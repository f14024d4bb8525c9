//! # Error Types
//!
//! Domain-specific error types for bazaar-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  bazaar-core errors (this file)                                        │
//! │  ├── CoreError        - Cache construction, mutation state machine     │
//! │  └── ValidationError  - Listing draft validation failures              │
//! │                                                                         │
//! │  bazaar-store errors (separate crate)                                  │
//! │  └── StoreError       - Storage primitive failures                     │
//! │                                                                         │
//! │  bazaar-sync errors (separate crate)                                   │
//! │  ├── RemoteError      - Remote API failures (transient / permanent)    │
//! │  └── SyncError        - Queue / engine / config failures               │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → ApiError → UI         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::types::MutationStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A cache was constructed with a capacity of zero.
    ///
    /// This is the only construction-time failure of [`crate::BoundedCache`];
    /// every other cache operation is total.
    #[error("Cache max size must be greater than zero, got {0}")]
    InvalidCacheSize(usize),

    /// A mutation was asked to perform a transition its status forbids.
    ///
    /// ## When This Occurs
    /// - `retry` on a record that is not `failed`
    /// - `begin_attempt` on a record that is already `in_flight` or `completed`
    /// - recording an outcome for a record that is not `in_flight`
    #[error("Mutation {id} is {status}, cannot {action}")]
    InvalidTransition {
        id: String,
        status: MutationStatus,
        action: &'static str,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates an InvalidTransition error.
    pub fn invalid_transition(
        id: impl Into<String>,
        status: MutationStatus,
        action: &'static str,
    ) -> Self {
        CoreError::InvalidTransition {
            id: id.into(),
            status,
            action,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., invalid currency code, invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Attachment exceeds the upload size limit.
    #[error("attachment is {actual} bytes, limit is {max} bytes")]
    AttachmentTooLarge { actual: usize, max: usize },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InvalidCacheSize(0);
        assert_eq!(
            err.to_string(),
            "Cache max size must be greater than zero, got 0"
        );

        let err = CoreError::invalid_transition("m-1", MutationStatus::Completed, "retry");
        assert_eq!(err.to_string(), "Mutation m-1 is completed, cannot retry");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "title".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
