//! Saga error types.

use common::{TenantId, TransactionId};
use messaging::{CodecError, ProducerError};
use saga_store::StoreError;
use thiserror::Error;

/// Errors that can occur during saga operations.
///
/// Domain rejections are not errors; they become saga state transitions.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The saga definition failed validation.
    #[error("Invalid saga: {0}")]
    Invalid(String),

    #[error("Saga not found: {transaction_id} (tenant {tenant_id})")]
    NotFound {
        tenant_id: TenantId,
        transaction_id: TransactionId,
    },

    /// A saga with this transaction id already exists for the tenant.
    #[error("Saga already exists: {0}")]
    AlreadyExists(TransactionId),

    /// The operation needs a terminal saga.
    #[error("Saga still active: {0}")]
    Active(TransactionId),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Sending a command or outcome failed.
    #[error("Producer error: {0}")]
    Producer(#[from] ProducerError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
