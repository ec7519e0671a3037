//! # Database and Service Error Types
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError ← Adds context and categorization (busy/locked → Conflict)    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ServiceError ← Domain(CoreError) | Storage(DbError)                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ErrorKind → façade maps to a client or server response                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;
use toolrent_core::{CoreError, ValidationError};

/// Storage-level failures.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A UNIQUE index rejected the row (e.g. a rut registered twice).
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Another writer held the lock past `busy_timeout` (SQLITE_BUSY /
    /// SQLITE_LOCKED). The transaction was rolled back; retrying is safe.
    #[error("Database busy: {0}")]
    Conflict(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Any other statement error, including CHECK and trigger aborts.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Stored data that cannot be interpreted, or an unexpected driver error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Whether the failure was lock contention rather than bad input.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DbError::Conflict(_))
    }
}

// SQLite primary/extended result codes for contention.
const SQLITE_BUSY: &str = "5";
const SQLITE_LOCKED: &str = "6";
const SQLITE_BUSY_SNAPSHOT: &str = "517";

/// ```text
/// RowNotFound            → NotFound
/// Database(busy/locked)  → Conflict
/// Database(UNIQUE)       → UniqueViolation { field: "table.column" }
/// Database(FOREIGN KEY)  → ForeignKeyViolation
/// Database(other)        → QueryFailed
/// PoolTimedOut           → PoolExhausted
/// PoolClosed             → ConnectionFailed
/// anything else          → Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),
            sqlx::Error::Database(db_err) => classify(db_err.code().as_deref(), db_err.message()),
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),
            _ => DbError::Internal(err.to_string()),
        }
    }
}

fn classify(code: Option<&str>, msg: &str) -> DbError {
    let busy = matches!(code, Some(SQLITE_BUSY | SQLITE_LOCKED | SQLITE_BUSY_SNAPSHOT))
        || msg.contains("database is locked");
    if busy {
        return DbError::Conflict(msg.to_string());
    }

    if let Some(columns) = msg.strip_prefix("UNIQUE constraint failed: ") {
        return DbError::duplicate(columns, "unknown");
    }
    if msg.contains("FOREIGN KEY constraint failed") {
        return DbError::ForeignKeyViolation {
            message: msg.to_string(),
        };
    }
    DbError::QueryFailed(msg.to_string())
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Service Error
// =============================================================================

/// Error categories surfaced to façades.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    InsufficientStock,
    Conflict,
    /// Storage fault. Opaque to the caller.
    Internal,
}

/// What `InventoryService` and `LendingService` return.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] CoreError),

    #[error("Storage error: {0}")]
    Storage(DbError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Domain(CoreError::Validation(_)) => ErrorKind::Validation,
            ServiceError::Domain(CoreError::NotFound { .. }) => ErrorKind::NotFound,
            ServiceError::Domain(CoreError::InsufficientStock { .. }) => {
                ErrorKind::InsufficientStock
            }
            ServiceError::Domain(CoreError::Conflict(_)) => ErrorKind::Conflict,
            ServiceError::Storage(_) => ErrorKind::Internal,
        }
    }

    /// The validation error, if this is one. Handy in tests and façades.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            ServiceError::Domain(CoreError::Validation(v)) => Some(v),
            _ => None,
        }
    }
}

/// NotFound and Conflict are domain categories; everything else stays opaque.
impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => CoreError::NotFound { entity, id }.into(),
            DbError::Conflict(msg) => CoreError::Conflict(msg).into(),
            other => ServiceError::Storage(other),
        }
    }
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        ServiceError::Domain(err.into())
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        DbError::from(err).into()
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;
