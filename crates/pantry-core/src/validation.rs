//! # Validation Module
//!
//! Input validation for drafts, ids and query parameters.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Capture / form (presentation, out of scope)                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE - runs before any write or query                 │
//! │  ├── ids non-empty and bounded                                         │
//! │  ├── quantities finite and non-negative                                │
//! │  ├── confidences in [0, 1]                                             │
//! │  └── windows in [0, MAX_WINDOW_DAYS]                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Store constraints (primary keys, NOT NULL)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::types::Quantity;
use crate::{MAX_ID_LENGTH, MAX_WINDOW_DAYS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validates an opaque identifier (household, product, location, item).
///
/// ## Rules
/// - Must not be empty or whitespace
/// - At most `MAX_ID_LENGTH` characters
///
/// ## Example
/// ```rust
/// use pantry_core::validation::validate_id;
///
/// assert!(validate_id("household_id", "h1").is_ok());
/// assert!(validate_id("household_id", "  ").is_err());
/// ```
pub fn validate_id(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > MAX_ID_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_ID_LENGTH,
        });
    }

    Ok(())
}

/// Validates a quantity.
///
/// ## Rules
/// - Must be finite
/// - Must be >= 0, or > 0 when `allow_zero` is false
pub fn validate_quantity(quantity: &Quantity, allow_zero: bool) -> ValidationResult<()> {
    if !quantity.value.is_finite() {
        return Err(ValidationError::InvalidQuantity {
            reason: "value must be a finite number".to_string(),
        });
    }

    if quantity.value < 0.0 {
        return Err(ValidationError::InvalidQuantity {
            reason: "value must not be negative".to_string(),
        });
    }

    if !allow_zero && quantity.value == 0.0 {
        return Err(ValidationError::InvalidQuantity {
            reason: "value must be greater than zero".to_string(),
        });
    }

    Ok(())
}

/// Validates an extraction confidence.
pub fn validate_confidence(field: &str, confidence: f64) -> ValidationResult<()> {
    if !(0.0..=1.0).contains(&confidence) {
        return Err(ValidationError::InvalidConfidence {
            field: field.to_string(),
            value: confidence,
        });
    }
    Ok(())
}

/// Validates an expiring-window length in days.
///
/// ## Example
/// ```rust
/// use pantry_core::validation::validate_window;
///
/// assert_eq!(validate_window(3).unwrap(), 3);
/// assert!(validate_window(-1).is_err());
/// ```
pub fn validate_window(days: i64) -> ValidationResult<u32> {
    if days < 0 || days > i64::from(MAX_WINDOW_DAYS) {
        return Err(ValidationError::InvalidWindow {
            days,
            max: MAX_WINDOW_DAYS,
        });
    }
    Ok(days as u32)
}

/// Validates a storage location name (1-100 characters).
pub fn validate_location_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.chars().count() > 100 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 100,
        });
    }

    Ok(())
}

/// Validates free-text notes.
pub fn validate_notes(notes: &str) -> ValidationResult<()> {
    if notes.chars().count() > 1000 {
        return Err(ValidationError::TooLong {
            field: "notes".to_string(),
            max: 1000,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Unit;

    #[test]
    fn test_validate_id() {
        assert!(validate_id("id", "abc").is_ok());
        assert!(validate_id("id", "").is_err());
        assert!(validate_id("id", &"x".repeat(MAX_ID_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        let zero = Quantity { value: 0.0, unit: Unit::Gram };
        assert!(validate_quantity(&zero, true).is_ok());
        assert!(validate_quantity(&zero, false).is_err());

        let inf = Quantity { value: f64::INFINITY, unit: Unit::Gram };
        assert!(validate_quantity(&inf, true).is_err());
    }

    #[test]
    fn test_validate_confidence() {
        assert!(validate_confidence("expiry", 0.0).is_ok());
        assert!(validate_confidence("expiry", 1.0).is_ok());
        assert!(validate_confidence("expiry", 1.01).is_err());
        assert!(validate_confidence("expiry", f64::NAN).is_err());
    }

    #[test]
    fn test_validate_window() {
        assert!(validate_window(0).is_ok());
        assert!(validate_window(i64::from(MAX_WINDOW_DAYS)).is_ok());
        assert!(validate_window(i64::from(MAX_WINDOW_DAYS) + 1).is_err());
    }
}
