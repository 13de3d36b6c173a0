//! # Error Types
//!
//! Domain and port error types for pantry-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  pantry-core (this file)                                               │
//! │  ├── CoreError        - Business rule violations (never retried)       │
//! │  ├── ValidationError  - Input validation failures                      │
//! │  ├── RepositoryError  - What a local store port reports                │
//! │  └── RemoteError      - What the remote gateway port reports           │
//! │                                                                         │
//! │  pantry-db                                                             │
//! │  └── DbError          - sqlx failures, converted into RepositoryError  │
//! │                                                                         │
//! │  pantry-sync                                                           │
//! │  └── SyncError        - What use-case callers see                      │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError ─┐                                  │
//! │        DbError → RepositoryError ───┼──► SyncError → caller            │
//! │        RemoteError ──► recorded in sync metadata, never returned       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::types::{ItemStatus, Unit};

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations.
///
/// Always surfaced synchronously to the caller and never retried.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Item does not exist in the caller's household.
    ///
    /// Also returned for items that exist in another household, so the
    /// caller cannot probe for existence across households.
    #[error("Inventory item not found: {0}")]
    ItemNotFound(String),

    /// Not enough active stock to satisfy a consume request.
    ///
    /// ## User Workflow
    /// ```text
    /// Consume 3 pieces of "milk"
    ///      │
    ///      ▼
    /// Active batches (FEFO): [1 piece, 1 piece]
    ///      │
    ///      ▼
    /// InsufficientStock { product_id: "milk", available: 2, requested: 3 }
    /// ```
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: f64,
        requested: f64,
    },

    /// Two quantities cannot be combined (e.g. grams and pieces).
    #[error("Incompatible units: {expected} and {actual}")]
    IncompatibleUnit { expected: Unit, actual: Unit },

    /// Status transitions only move forward out of `active`.
    #[error("Item {item_id} cannot move from {from} to {to}")]
    InvalidStatusTransition {
        item_id: String,
        from: ItemStatus,
        to: ItemStatus,
    },

    /// A move or date change would give an active batch the merge key of
    /// another active batch.
    #[error("Item {item_id} would duplicate active batch {existing_id}")]
    MergeKeyTaken { item_id: String, existing_id: String },

    /// Sync metadata state machine violation.
    #[error("Sync metadata for {item_id} cannot move from {from} to {to}")]
    InvalidSyncTransition {
        item_id: String,
        from: String,
        to: String,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Quantity is negative, zero where not allowed, or not finite.
    #[error("Invalid quantity: {reason}")]
    InvalidQuantity { reason: String },

    /// Expiry window outside the accepted range.
    #[error("Window must be between 0 and {max} days, got {days}")]
    InvalidWindow { days: i64, max: u32 },

    /// Extraction confidence outside `[0, 1]`.
    #[error("{field} confidence must be between 0 and 1, got {value}")]
    InvalidConfidence { field: String, value: f64 },

    /// Storage location does not exist in the household.
    #[error("Unknown storage location: {0}")]
    UnknownLocation(String),

    /// Location cannot be removed while items reference it.
    #[error("Storage location {location_id} is still referenced by {items} item(s)")]
    LocationInUse { location_id: String, items: i64 },

    /// Value is not in the allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Port Errors
// =============================================================================

/// Failure reported by a local store port.
///
/// Fatal for the current call. A failed batch call leaves previously
/// committed records untouched.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The backing store is unreachable (closed pool, missing file).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A write violated a store constraint.
    #[error("Constraint violated: {0}")]
    Constraint(String),

    /// A persisted record could not be decoded.
    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },

    /// Any other backend failure.
    #[error("Store failure: {0}")]
    Backend(String),
}

/// Failure reported by the remote gateway port.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// The backend could not be reached.
    #[error("Remote unreachable: {0}")]
    Unreachable(String),

    /// The backend refused the request.
    #[error("Remote rejected request: {0}")]
    Rejected(String),

    /// The request did not finish in time.
    #[error("Remote request timed out")]
    Timeout,
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

/// Result type returned by local store ports.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Result type returned by the remote gateway port.
pub type RemoteResult<T> = Result<T, RemoteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product_id: "milk".to_string(),
            available: 2.0,
            requested: 3.0,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for milk: available 2, requested 3"
        );

        let err = CoreError::IncompatibleUnit {
            expected: Unit::Piece,
            actual: Unit::Gram,
        };
        assert_eq!(err.to_string(), "Incompatible units: piece and g");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "household_id".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
