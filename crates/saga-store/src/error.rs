use common::{TenantId, TransactionId};
use thiserror::Error;

/// Errors that can occur when interacting with the saga store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The stored record's version did not match the caller's expectation.
    #[error(
        "Version conflict for saga {transaction_id} (tenant {tenant_id}): expected version {expected}, found {actual}"
    )]
    VersionConflict {
        tenant_id: TenantId,
        transaction_id: TransactionId,
        expected: i64,
        actual: i64,
    },

    /// A write would move a pending saga's step index backwards.
    #[error(
        "Stale write for saga {transaction_id}: stored step index {stored}, attempted {attempted}"
    )]
    StaleWrite {
        transaction_id: TransactionId,
        stored: u32,
        attempted: u32,
    },

    /// The saga was not found.
    #[error("Saga not found: {transaction_id} (tenant {tenant_id})")]
    NotFound {
        tenant_id: TenantId,
        transaction_id: TransactionId,
    },

    /// A stored row held a status this build does not understand.
    #[error("Invalid stored status: {0}")]
    InvalidStatus(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for saga store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
