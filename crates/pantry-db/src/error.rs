//! # Database Errors
//!
//! Error types for local store operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Error Propagation                                  │
//! │                                                                         │
//! │  sqlx::Error ──────► DbError ──────► RepositoryError ──────► SyncError │
//! │  (raw SQLite)        (this crate)    (port, pantry-core)     (caller)  │
//! │                                                                         │
//! │  serde_json::Error ─► DbError::Decode (corrupt payload column)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use pantry_core::RepositoryError;
use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// A guarded write matched no row.
    ///
    /// ## When This Occurs
    /// - Upsert that would move a terminal item back to active
    /// - Upsert that would move an item to another household
    #[error("Write rejected for {entity} {id}: {reason}")]
    WriteRejected {
        entity: String,
        id: String,
        reason: String,
    },

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A stored row could not be turned back into a domain value.
    #[error("Corrupt {entity} row {id}: {reason}")]
    Decode {
        entity: String,
        id: String,
        reason: String,
    },

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn rejected(entity: impl Into<String>, id: impl Into<String>, reason: impl Into<String>) -> Self {
        DbError::WriteRejected {
            entity: entity.into(),
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn decode(entity: impl Into<String>, id: impl Into<String>, reason: impl ToString) -> Self {
        DbError::Decode {
            entity: entity.into(),
            id: id.into(),
            reason: reason.to_string(),
        }
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // "UNIQUE constraint failed: <table>.<column>"
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Collapses store errors into the port-level error the core understands.
impl From<DbError> for RepositoryError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::ConnectionFailed(_) | DbError::PoolExhausted => RepositoryError::Unavailable(err.to_string()),
            DbError::UniqueViolation { .. } | DbError::WriteRejected { .. } => {
                RepositoryError::Constraint(err.to_string())
            }
            DbError::Decode { id, reason, .. } => RepositoryError::Corrupt { id, reason },
            other => RepositoryError::Backend(other.to_string()),
        }
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
