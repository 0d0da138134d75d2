use async_trait::async_trait;
use common::{TenantId, TransactionId};

use crate::{Result, SagaQuery, SagaRecord, SagaStatus, StoreError};

/// Options for writing a saga record.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// Expected stored version for optimistic concurrency control.
    /// If None, no version check is performed.
    pub expected_version: Option<i64>,
}

impl PutOptions {
    /// Creates options with no version check.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options expecting the stored record to be at a specific version.
    pub fn expect_version(version: i64) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// Creates options expecting no record to exist yet.
    pub fn expect_new() -> Self {
        Self {
            expected_version: Some(0),
        }
    }
}

/// Core trait for saga persistence.
///
/// Records are keyed by `(tenant id, transaction id)`. All implementations
/// must be thread-safe (Send + Sync). Callers serialize writes to a single
/// key; the store only guards against stale versions and step regressions.
#[async_trait]
pub trait SagaStore: Send + Sync {
    /// Writes a record, replacing any stored state for the same key.
    ///
    /// Fails with `VersionConflict` if `options.expected_version` is set and
    /// differs from the stored version, and with `StaleWrite` if the stored
    /// saga is pending and the write would lower its step index.
    ///
    /// Returns the new stored version.
    async fn put(&self, record: SagaRecord, options: PutOptions) -> Result<i64>;

    /// Retrieves a record by key.
    async fn get(
        &self,
        tenant_id: TenantId,
        transaction_id: TransactionId,
    ) -> Result<Option<SagaRecord>>;

    /// Deletes a record. Returns true if something was removed.
    async fn delete(&self, tenant_id: TenantId, transaction_id: TransactionId) -> Result<bool>;

    /// Retrieves records matching a query.
    async fn query(&self, query: SagaQuery) -> Result<Vec<SagaRecord>>;
}

/// Extension trait providing convenience methods for saga stores.
#[async_trait]
pub trait SagaStoreExt: SagaStore {
    /// Retrieves a record or fails with `NotFound`.
    async fn require(
        &self,
        tenant_id: TenantId,
        transaction_id: TransactionId,
    ) -> Result<SagaRecord> {
        self.get(tenant_id, transaction_id)
            .await?
            .ok_or(StoreError::NotFound {
                tenant_id,
                transaction_id,
            })
    }

    /// Checks whether a saga exists.
    async fn exists(&self, tenant_id: TenantId, transaction_id: TransactionId) -> Result<bool> {
        Ok(self.get(tenant_id, transaction_id).await?.is_some())
    }

    /// Retrieves every non-terminal saga across tenants.
    async fn active(&self) -> Result<Vec<SagaRecord>> {
        self.query(SagaQuery::active()).await
    }
}

// Blanket implementation for all SagaStore implementations
impl<T: SagaStore + ?Sized> SagaStoreExt for T {}

/// The stored columns a put must be checked against.
#[derive(Debug, Clone, Copy)]
pub struct StoredState {
    pub version: i64,
    pub status: SagaStatus,
    pub current_step_index: u32,
}

/// Validates a write against the currently stored state (if any).
///
/// Shared by every implementation so the rules cannot drift between them.
pub fn check_put(
    record: &SagaRecord,
    stored: Option<StoredState>,
    options: &PutOptions,
) -> Result<()> {
    let actual = stored.map(|s| s.version).unwrap_or(0);

    if let Some(expected) = options.expected_version
        && expected != actual
    {
        return Err(StoreError::VersionConflict {
            tenant_id: record.tenant.id,
            transaction_id: record.transaction_id,
            expected,
            actual,
        });
    }

    if let Some(stored) = stored
        && stored.status == SagaStatus::Pending
        && record.current_step_index < stored.current_step_index
    {
        return Err(StoreError::StaleWrite {
            transaction_id: record.transaction_id,
            stored: stored.current_step_index,
            attempted: record.current_step_index,
        });
    }

    Ok(())
}
