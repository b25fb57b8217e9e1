//! # Database Error Types
//!
//! Error types for everything at the transaction boundary.
//!
//! ## Taxonomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Taxonomy                                       │
//! │                                                                         │
//! │  Validation          caller can fix the input and retry                │
//! │  NotFound            referenced entity absent                          │
//! │  StateConflict /     operation not permitted in the current            │
//! │  AlreadyCancelled    lifecycle state                                   │
//! │  InsufficientStock   business-rule rejection, not a system fault       │
//! │  Timeout /           transient: the whole operation is safe            │
//! │  PoolExhausted       to retry                                          │
//! │  Invariant           internal consistency failure (ledger sum vs       │
//! │                      counter). Fatal: logged loudly, never swallowed   │
//! │                                                                         │
//! │  Any failure aborts the enclosing transaction. Partial commits         │
//! │  must never be observable.                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use kardex_core::{CoreError, PurchaseStatus, ValidationError};
use thiserror::Error;

/// Database and orchestration errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Input failed validation before any transaction was opened.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Operation not permitted in the entity's current lifecycle state.
    ///
    /// ## When This Occurs
    /// - Editing a purchase after `shipped`
    /// - Deleting a purchase that posted stock
    /// - Completing a completed/cancelled purchase
    /// - Editing a cancelled sale
    #[error("{entity} {id} is {status}, cannot {operation}")]
    StateConflict {
        entity: String,
        id: String,
        status: String,
        operation: String,
    },

    /// A sale was already cancelled; its reversal ran exactly once.
    #[error("Sale {id} is already cancelled")]
    AlreadyCancelled { id: String },

    /// Not enough stock to cover the requested quantity.
    ///
    /// Carries everything the caller needs to render a message.
    #[error("Insufficient stock for {name}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        name: String,
        available: i64,
        requested: i64,
    },

    /// Unique constraint violation.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// The operation exceeded its time budget and was rolled back whole.
    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// The database reported it is busy/locked (concurrent writer).
    #[error("Database busy: {0}")]
    Busy(String),

    /// Internal consistency failure. Indicates a bug, not a user error.
    ///
    /// ## Handling
    /// Never caught and discarded: it aborts the operation and is logged
    /// at error level by the raising site.
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

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

    /// Creates a StateConflict error.
    pub fn state_conflict(
        entity: impl Into<String>,
        id: impl Into<String>,
        status: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        DbError::StateConflict {
            entity: entity.into(),
            id: id.into(),
            status: status.into(),
            operation: operation.into(),
        }
    }

    /// StateConflict for a purchase in a given status.
    pub fn purchase_conflict(
        id: impl Into<String>,
        status: PurchaseStatus,
        operation: impl Into<String>,
    ) -> Self {
        DbError::state_conflict("Purchase", id, status.as_str(), operation)
    }

    /// Whether retrying the whole operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DbError::Timeout { .. } | DbError::PoolExhausted | DbError::Busy(_)
        )
    }
}

/// Convert core business errors into the boundary error type.
impl From<CoreError> for DbError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(v) => DbError::Validation(v),
            other => DbError::QueryFailed(other.to_string()),
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
/// "database is locked/busy"   → DbError::Busy (transient)
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

                // SQLite error messages for constraints:
                // UNIQUE constraint: "UNIQUE constraint failed: <table>.<column>"
                // FK constraint: "FOREIGN KEY constraint failed"
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
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("database is locked") || msg.contains("database is busy") {
                    DbError::Busy(msg.to_string())
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

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = DbError::InsufficientStock {
            product_id: "p1".to_string(),
            name: "Cafe 250g".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for Cafe 250g: available 3, requested 5"
        );

        let err = DbError::purchase_conflict("pc1", PurchaseStatus::Completed, "edit");
        assert_eq!(err.to_string(), "Purchase pc1 is completed, cannot edit");
    }

    #[test]
    fn test_transient_classification() {
        assert!(DbError::PoolExhausted.is_transient());
        assert!(DbError::Timeout {
            operation: "cancel_sale".to_string(),
            seconds: 10,
        }
        .is_transient());
        assert!(DbError::Busy("database is locked".to_string()).is_transient());
        assert!(!DbError::not_found("Sale", "x").is_transient());
        assert!(!DbError::Invariant("ledger mismatch".to_string()).is_transient());
    }
}
