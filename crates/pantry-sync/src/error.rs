//! # Sync Error Types
//!
//! What callers of the orchestrator see.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │  Connectivity   │  │     Domain / Store      │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Connectivity-  │  │  Core (validation,      │ │
//! │  │  ConfigLoad...  │  │  Unavailable    │  │   stock, transitions)   │ │
//! │  │  ConfigSave...  │  │  { operation }  │  │  Repository             │ │
//! │  │                 │  │  Remote         │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  Push failures during a drain never show up here: they are recorded   │
//! │  on the sync metadata of the affected item instead.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use pantry_core::{CoreError, RemoteError, RepositoryError, ValidationError};

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Error type returned by every use case in this crate.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration value.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Missing device ID.
    #[error("Device ID not configured. Run initial setup first.")]
    MissingDeviceId,

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Connectivity Errors
    // =========================================================================
    /// An operation that needs a live remote answer was called offline.
    #[error("{operation} requires connectivity")]
    ConnectivityUnavailable { operation: String },

    /// The remote answered with an error during a call that needs its answer.
    #[error("{operation} failed at the remote: {source}")]
    Remote {
        operation: String,
        #[source]
        source: RemoteError,
    },

    // =========================================================================
    // Domain and Store Errors
    // =========================================================================
    /// Business rule violation. Never retried.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The local store failed. Previously committed data is untouched.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// The background worker is gone.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl SyncError {
    pub fn offline(operation: impl Into<String>) -> Self {
        SyncError::ConnectivityUnavailable {
            operation: operation.into(),
        }
    }

    pub fn remote(operation: impl Into<String>, source: RemoteError) -> Self {
        SyncError::Remote {
            operation: operation.into(),
            source,
        }
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<ValidationError> for SyncError {
    fn from(err: ValidationError) -> Self {
        SyncError::Core(CoreError::Validation(err))
    }
}

impl From<pantry_db::DbError> for SyncError {
    fn from(err: pantry_db::DbError) -> Self {
        SyncError::Repository(err.into())
    }
}

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

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if the same call may succeed later without changes.
    ///
    /// ## Retryable Errors
    /// - Connectivity unavailable
    /// - Remote unreachable or timed out
    /// - Store unavailable (closed pool, locked file)
    ///
    /// ## Non-Retryable Errors
    /// - Domain validation and business rules
    /// - Constraint violations and corrupt records
    /// - Configuration errors
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::ConnectivityUnavailable { .. }
                | SyncError::Remote {
                    source: RemoteError::Unreachable(_) | RemoteError::Timeout,
                    ..
                }
                | SyncError::Repository(RepositoryError::Unavailable(_))
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::MissingDeviceId
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }

    /// Returns true for caller mistakes (bad input, missing item, stock).
    pub fn is_domain_error(&self) -> bool {
        matches!(self, SyncError::Core(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::offline("refresh_from_remote").is_retryable());
        assert!(SyncError::Repository(RepositoryError::Unavailable("pool closed".into())).is_retryable());

        assert!(SyncError::remote("refresh_from_remote", RemoteError::Timeout).is_retryable());

        assert!(!SyncError::remote("refresh_from_remote", RemoteError::Rejected("quota".into())).is_retryable());
        assert!(!SyncError::InvalidConfig("bad config".into()).is_retryable());
        assert!(!SyncError::Core(CoreError::ItemNotFound("i1".into())).is_retryable());
        assert!(!SyncError::Repository(RepositoryError::Constraint("dup".into())).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::offline("refresh_from_remote");
        assert_eq!(err.to_string(), "refresh_from_remote requires connectivity");

        let err: SyncError = CoreError::ItemNotFound("abc-123".into()).into();
        assert!(err.to_string().contains("abc-123"));
        assert!(err.is_domain_error());
    }

    #[test]
    fn test_validation_becomes_domain_error() {
        let err: SyncError = ValidationError::UnknownLocation("attic".into()).into();
        assert!(matches!(err, SyncError::Core(CoreError::Validation(_))));
    }
}
