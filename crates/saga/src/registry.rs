//! Tenant-scoped saga registry over a [`SagaStore`].
//!
//! Writes to one saga are serialized through a per-key async lock held by the
//! caller for the whole load-mutate-save cycle. The store's version check
//! catches writers in other processes.

use std::collections::HashMap;
use std::sync::Arc;

use common::{TenantId, TransactionId};
use saga_store::{PutOptions, SagaQuery, SagaStore, StoreError};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{Result, SagaError};
use crate::model::Saga;

type Key = (TenantId, TransactionId);

pub struct SagaRegistry<S: SagaStore> {
    store: Arc<S>,
    locks: Mutex<HashMap<Key, Arc<Mutex<()>>>>,
}

impl<S: SagaStore> SagaRegistry<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Acquires the write lock for one saga.
    pub async fn lock(&self, tenant_id: TenantId, transaction_id: TransactionId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry((tenant_id, transaction_id)).or_default())
        };
        lock.lock_owned().await
    }

    pub async fn get(
        &self,
        tenant_id: TenantId,
        transaction_id: TransactionId,
    ) -> Result<Option<Saga>> {
        self.store
            .get(tenant_id, transaction_id)
            .await?
            .map(Saga::from_record)
            .transpose()
    }

    /// Stores a saga that must not exist yet.
    pub async fn insert(&self, saga: &mut Saga) -> Result<()> {
        let record = saga.to_record()?;
        match self.store.put(record, PutOptions::expect_new()).await {
            Ok(version) => {
                saga.version = version;
                Ok(())
            }
            Err(StoreError::VersionConflict { .. }) => {
                Err(SagaError::AlreadyExists(saga.transaction_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stores an updated saga, expecting the version it was loaded at.
    pub async fn put(&self, saga: &mut Saga) -> Result<()> {
        let record = saga.to_record()?;
        saga.version = self
            .store
            .put(record, PutOptions::expect_version(saga.version))
            .await?;
        Ok(())
    }

    /// Deletes a saga. Callers usually hold its lock, so the lock entry is
    /// left for [`SagaRegistry::prune_locks`].
    pub async fn delete(&self, tenant_id: TenantId, transaction_id: TransactionId) -> Result<bool> {
        Ok(self.store.delete(tenant_id, transaction_id).await?)
    }

    pub async fn query(&self, query: SagaQuery) -> Result<Vec<Saga>> {
        self.store
            .query(query)
            .await?
            .into_iter()
            .map(Saga::from_record)
            .collect()
    }

    /// Drops lock entries nobody holds or waits on.
    pub async fn prune_locks(&self) -> usize {
        let mut locks = self.locks.lock().await;
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }
}
