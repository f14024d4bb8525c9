//! # Validation Module
//!
//! Business-rule checks applied to listing drafts before they are queued.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: UI (React Native)                                            │
//! │  └── Field-level feedback while typing                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Host command (Rust)                                          │
//! │  └── THIS MODULE: reject drafts that can never succeed                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Server                                                       │
//! │  └── Authoritative checks; 4xx surfaces as a permanent RemoteError     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A draft is validated once, when it is created. Queued drafts are replayed
//! as-is.

use crate::error::ValidationError;
use crate::types::ListingDraft;
use crate::{MAX_ATTACHMENT_BYTES, MAX_DESCRIPTION_LEN, MAX_PRICE_CENTS, MAX_TITLE_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a listing title.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most 120 characters
pub fn validate_title(title: &str) -> ValidationResult<()> {
    let title = title.trim();

    if title.is_empty() {
        return Err(ValidationError::Required {
            field: "title".to_string(),
        });
    }

    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ValidationError::TooLong {
            field: "title".to_string(),
            max: MAX_TITLE_LEN,
        });
    }

    Ok(())
}

pub fn validate_description(description: &str) -> ValidationResult<()> {
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(ValidationError::TooLong {
            field: "description".to_string(),
            max: MAX_DESCRIPTION_LEN,
        });
    }
    Ok(())
}

/// Validates an ISO 4217 currency code: exactly three ASCII uppercase letters.
pub fn validate_currency(code: &str) -> ValidationResult<()> {
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ValidationError::InvalidFormat {
            field: "currency".to_string(),
            reason: format!("expected a 3-letter ISO 4217 code, got {code:?}"),
        });
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates an asking price in cents. Zero is allowed (free items).
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if !(0..=MAX_PRICE_CENTS).contains(&cents) {
        return Err(ValidationError::OutOfRange {
            field: "price_cents".to_string(),
            min: 0,
            max: MAX_PRICE_CENTS,
        });
    }
    Ok(())
}

pub fn validate_attachment(bytes: &[u8]) -> ValidationResult<()> {
    if bytes.len() > MAX_ATTACHMENT_BYTES {
        return Err(ValidationError::AttachmentTooLarge {
            actual: bytes.len(),
            max: MAX_ATTACHMENT_BYTES,
        });
    }
    Ok(())
}

// =============================================================================
// Draft Validator
// =============================================================================

/// Validates every field of a draft, stopping at the first failure.
pub fn validate_listing_draft(draft: &ListingDraft) -> ValidationResult<()> {
    validate_title(&draft.title)?;
    validate_description(&draft.description)?;
    validate_price_cents(draft.price_cents)?;
    validate_currency(&draft.currency)?;

    if let Some(category) = &draft.category {
        if category.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "category".to_string(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> ListingDraft {
        ListingDraft {
            title: "Road bike, 56cm".to_string(),
            description: "Lightly used".to_string(),
            price_cents: 45_000,
            currency: "EUR".to_string(),
            category: Some("bikes".to_string()),
            location: None,
        }
    }

    #[test]
    fn test_valid_draft() {
        assert!(validate_listing_draft(&draft()).is_ok());
    }

    #[test]
    fn test_title_rules() {
        assert!(matches!(
            validate_title("   "),
            Err(ValidationError::Required { .. })
        ));
        assert!(validate_title(&"x".repeat(MAX_TITLE_LEN)).is_ok());
        assert!(matches!(
            validate_title(&"x".repeat(MAX_TITLE_LEN + 1)),
            Err(ValidationError::TooLong { max: MAX_TITLE_LEN, .. })
        ));
    }

    #[test]
    fn test_price_bounds() {
        assert!(validate_price_cents(0).is_ok());
        assert!(validate_price_cents(MAX_PRICE_CENTS).is_ok());
        assert!(validate_price_cents(-1).is_err());
        assert!(validate_price_cents(MAX_PRICE_CENTS + 1).is_err());
    }

    #[test]
    fn test_currency_format() {
        assert!(validate_currency("USD").is_ok());
        assert!(validate_currency("usd").is_err());
        assert!(validate_currency("US").is_err());
        assert!(validate_currency("USDT").is_err());
    }

    #[test]
    fn test_blank_category_rejected() {
        let mut d = draft();
        d.category = Some(" ".to_string());
        assert_eq!(
            validate_listing_draft(&d),
            Err(ValidationError::Required {
                field: "category".to_string()
            })
        );
    }

    #[test]
    fn test_attachment_limit() {
        assert!(validate_attachment(&[0u8; 16]).is_ok());
        let big = vec![0u8; MAX_ATTACHMENT_BYTES + 1];
        assert!(matches!(
            validate_attachment(&big),
            Err(ValidationError::AttachmentTooLarge { .. })
        ));
    }
}
