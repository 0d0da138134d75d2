use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{TenantId, TransactionId};
use tokio::sync::RwLock;

use crate::{
    Result, SagaQuery, SagaRecord,
    store::{PutOptions, SagaStore, StoredState, check_put},
};

type Key = (TenantId, TransactionId);

/// In-memory saga store for tests and single-process deployments.
///
/// Provides the same interface and write rules as the PostgreSQL store.
#[derive(Clone, Default)]
pub struct InMemorySagaStore {
    records: Arc<RwLock<HashMap<Key, SagaRecord>>>,
}

impl InMemorySagaStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of stored sagas.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Clears all records.
    pub async fn clear(&self) {
        self.records.write().await.clear();
    }
}

#[async_trait]
impl SagaStore for InMemorySagaStore {
    async fn put(&self, mut record: SagaRecord, options: PutOptions) -> Result<i64> {
        let key = (record.tenant.id, record.transaction_id);
        let mut records = self.records.write().await;

        let stored = records.get(&key).map(|r| StoredState {
            version: r.version,
            status: r.status,
            current_step_index: r.current_step_index,
        });
        check_put(&record, stored, &options)?;

        let version = stored.map(|s| s.version).unwrap_or(0) + 1;
        record.version = version;
        records.insert(key, record);

        Ok(version)
    }

    async fn get(
        &self,
        tenant_id: TenantId,
        transaction_id: TransactionId,
    ) -> Result<Option<SagaRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&(tenant_id, transaction_id)).cloned())
    }

    async fn delete(&self, tenant_id: TenantId, transaction_id: TransactionId) -> Result<bool> {
        let mut records = self.records.write().await;
        Ok(records.remove(&(tenant_id, transaction_id)).is_some())
    }

    async fn query(&self, query: SagaQuery) -> Result<Vec<SagaRecord>> {
        let records = self.records.read().await;
        let mut matched: Vec<_> = records
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        matched.sort_by_key(|r| (r.created_at, r.transaction_id));

        let offset = query.offset.unwrap_or(0);
        let matched = matched.into_iter().skip(offset);
        Ok(match query.limit {
            Some(limit) => matched.take(limit).collect(),
            None => matched.collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use common::Tenant;

    use super::*;
    use crate::{SagaStatus, SagaStoreExt, StoreError};

    fn tenant() -> Tenant {
        Tenant::new(TenantId::new(), "GMS", 83, 1)
    }

    fn record(tenant: &Tenant, transaction_id: TransactionId) -> SagaRecord {
        let now = Utc::now();
        SagaRecord {
            tenant: tenant.clone(),
            transaction_id,
            saga_type: "INVENTORY_TRANSACTION".to_string(),
            status: SagaStatus::Pending,
            current_step_index: 0,
            compensation_incomplete: false,
            outcome_pending: false,
            data: serde_json::json!({"steps": []}),
            version: 0,
            created_at: now,
            updated_at: now,
            timeout_at: None,
            terminal_at: None,
            awaiting_since: None,
        }
    }

    #[tokio::test]
    async fn put_and_get() {
        let store = InMemorySagaStore::new();
        let tenant = tenant();
        let txn = TransactionId::new();

        let version = store
            .put(record(&tenant, txn), PutOptions::expect_new())
            .await
            .unwrap();
        assert_eq!(version, 1);

        let loaded = store.get(tenant.id, txn).await.unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.transaction_id, txn);
    }

    #[tokio::test]
    async fn put_is_idempotent_without_version_check() {
        let store = InMemorySagaStore::new();
        let tenant = tenant();
        let txn = TransactionId::new();
        let rec = record(&tenant, txn);

        store.put(rec.clone(), PutOptions::new()).await.unwrap();
        store.put(rec, PutOptions::new()).await.unwrap();

        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn expect_new_conflicts_with_existing_record() {
        let store = InMemorySagaStore::new();
        let tenant = tenant();
        let txn = TransactionId::new();

        store
            .put(record(&tenant, txn), PutOptions::expect_new())
            .await
            .unwrap();
        let result = store
            .put(record(&tenant, txn), PutOptions::expect_new())
            .await;

        assert!(matches!(
            result,
            Err(StoreError::VersionConflict {
                expected: 0,
                actual: 1,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn pending_saga_step_index_never_regresses() {
        let store = InMemorySagaStore::new();
        let tenant = tenant();
        let txn = TransactionId::new();

        let mut advanced = record(&tenant, txn);
        advanced.current_step_index = 2;
        store.put(advanced, PutOptions::new()).await.unwrap();

        let stale = record(&tenant, txn);
        let result = store.put(stale, PutOptions::new()).await;
        assert!(matches!(
            result,
            Err(StoreError::StaleWrite {
                stored: 2,
                attempted: 0,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn same_transaction_id_is_isolated_per_tenant() {
        let store = InMemorySagaStore::new();
        let a = tenant();
        let b = tenant();
        let txn = TransactionId::new();

        store.put(record(&a, txn), PutOptions::expect_new()).await.unwrap();
        store.put(record(&b, txn), PutOptions::expect_new()).await.unwrap();

        assert_eq!(store.len().await, 2);
        assert!(store.delete(a.id, txn).await.unwrap());
        assert!(store.exists(b.id, txn).await.unwrap());
        assert!(matches!(
            store.require(a.id, txn).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn query_timed_out_and_purgeable() {
        let store = InMemorySagaStore::new();
        let tenant = tenant();
        let now = Utc::now();

        let mut expired = record(&tenant, TransactionId::new());
        expired.timeout_at = Some(now - Duration::seconds(1));
        store.put(expired.clone(), PutOptions::new()).await.unwrap();

        let mut fresh = record(&tenant, TransactionId::new());
        fresh.timeout_at = Some(now + Duration::minutes(5));
        store.put(fresh, PutOptions::new()).await.unwrap();

        let mut done = record(&tenant, TransactionId::new());
        done.status = SagaStatus::Completed;
        done.terminal_at = Some(now - Duration::hours(2));
        store.put(done.clone(), PutOptions::new()).await.unwrap();

        let mut stuck = record(&tenant, TransactionId::new());
        stuck.status = SagaStatus::Failed;
        stuck.compensation_incomplete = true;
        stuck.terminal_at = Some(now - Duration::hours(2));
        store.put(stuck, PutOptions::new()).await.unwrap();

        let timed_out = store.query(SagaQuery::timed_out(now)).await.unwrap();
        assert_eq!(timed_out.len(), 1);
        assert_eq!(timed_out[0].transaction_id, expired.transaction_id);

        let purgeable = store
            .query(SagaQuery::purgeable(now - Duration::hours(1)))
            .await
            .unwrap();
        assert_eq!(purgeable.len(), 1);
        assert_eq!(purgeable[0].transaction_id, done.transaction_id);
    }

    #[tokio::test]
    async fn unsent_outcomes_are_kept_from_purge() {
        let store = InMemorySagaStore::new();
        let tenant = tenant();
        let now = Utc::now();

        let mut unsent = record(&tenant, TransactionId::new());
        unsent.status = SagaStatus::Completed;
        unsent.outcome_pending = true;
        unsent.terminal_at = Some(now - Duration::hours(2));
        store.put(unsent.clone(), PutOptions::new()).await.unwrap();

        let purgeable = store
            .query(SagaQuery::purgeable(now - Duration::hours(1)))
            .await
            .unwrap();
        assert!(purgeable.is_empty());

        let pending = store.query(SagaQuery::outcome_unsent()).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].transaction_id, unsent.transaction_id);
    }

    #[tokio::test]
    async fn stale_query_matches_old_in_flight_commands_only() {
        let store = InMemorySagaStore::new();
        let tenant = tenant();
        let now = Utc::now();

        let mut old = record(&tenant, TransactionId::new());
        old.awaiting_since = Some(now - Duration::minutes(5));
        store.put(old.clone(), PutOptions::new()).await.unwrap();

        let mut recent = record(&tenant, TransactionId::new());
        recent.awaiting_since = Some(now);
        store.put(recent, PutOptions::new()).await.unwrap();

        let mut finished = record(&tenant, TransactionId::new());
        finished.status = SagaStatus::Completed;
        finished.awaiting_since = Some(now - Duration::minutes(5));
        store.put(finished, PutOptions::new()).await.unwrap();

        let stale = store
            .query(SagaQuery::stale(now - Duration::seconds(30)))
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].transaction_id, old.transaction_id);
    }
}
