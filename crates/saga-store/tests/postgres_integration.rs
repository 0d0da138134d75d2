//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p saga-store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{Duration, SubsecRound, Utc};
use common::{Tenant, TenantId, TransactionId};
use saga_store::{
    PostgresSagaStore, PutOptions, SagaQuery, SagaRecord, SagaStatus, SagaStore, SagaStoreExt,
    StoreError,
};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!("../../../migrations/001_create_sagas_table.sql"))
                .execute(&temp_pool)
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and a cleared table
async fn get_test_store() -> PostgresSagaStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE sagas")
        .execute(&pool)
        .await
        .unwrap();

    PostgresSagaStore::new(pool)
}

fn test_tenant() -> Tenant {
    Tenant::new(TenantId::new(), "GMS", 83, 1)
}

fn test_record(tenant: &Tenant, transaction_id: TransactionId) -> SagaRecord {
    // Postgres stores microseconds; truncate so round-trips compare equal
    let now = Utc::now().trunc_subsecs(3);
    SagaRecord {
        tenant: tenant.clone(),
        transaction_id,
        saga_type: "INVENTORY_TRANSACTION".to_string(),
        status: SagaStatus::Pending,
        current_step_index: 0,
        compensation_incomplete: false,
        outcome_pending: false,
        data: serde_json::json!({"initiatedBy": "test", "steps": []}),
        version: 0,
        created_at: now,
        updated_at: now,
        timeout_at: Some(now + Duration::minutes(5)),
        terminal_at: None,
        awaiting_since: None,
    }
}

#[tokio::test]
async fn put_and_get_roundtrip() {
    let store = get_test_store().await;
    let tenant = test_tenant();
    let txn = TransactionId::new();
    let record = test_record(&tenant, txn);

    let version = store
        .put(record.clone(), PutOptions::expect_new())
        .await
        .unwrap();
    assert_eq!(version, 1);

    let loaded = store.get(tenant.id, txn).await.unwrap().unwrap();
    assert_eq!(loaded.tenant, tenant);
    assert_eq!(loaded.status, SagaStatus::Pending);
    assert_eq!(loaded.data, record.data);
    assert_eq!(loaded.timeout_at, record.timeout_at);
    assert_eq!(loaded.version, 1);
}

#[tokio::test]
async fn update_increments_version() {
    let store = get_test_store().await;
    let tenant = test_tenant();
    let txn = TransactionId::new();

    store
        .put(test_record(&tenant, txn), PutOptions::expect_new())
        .await
        .unwrap();

    let mut next = test_record(&tenant, txn);
    next.current_step_index = 1;
    let version = store
        .put(next, PutOptions::expect_version(1))
        .await
        .unwrap();
    assert_eq!(version, 2);

    let loaded = store.require(tenant.id, txn).await.unwrap();
    assert_eq!(loaded.current_step_index, 1);
}

#[tokio::test]
async fn stale_version_is_rejected() {
    let store = get_test_store().await;
    let tenant = test_tenant();
    let txn = TransactionId::new();

    store
        .put(test_record(&tenant, txn), PutOptions::expect_new())
        .await
        .unwrap();
    store
        .put(test_record(&tenant, txn), PutOptions::expect_version(1))
        .await
        .unwrap();

    let result = store
        .put(test_record(&tenant, txn), PutOptions::expect_version(1))
        .await;
    assert!(matches!(
        result,
        Err(StoreError::VersionConflict {
            expected: 1,
            actual: 2,
            ..
        })
    ));
}

#[tokio::test]
async fn pending_step_index_cannot_regress() {
    let store = get_test_store().await;
    let tenant = test_tenant();
    let txn = TransactionId::new();

    let mut advanced = test_record(&tenant, txn);
    advanced.current_step_index = 3;
    store.put(advanced, PutOptions::new()).await.unwrap();

    let result = store.put(test_record(&tenant, txn), PutOptions::new()).await;
    assert!(matches!(result, Err(StoreError::StaleWrite { .. })));
}

#[tokio::test]
async fn tenants_do_not_share_transaction_ids() {
    let store = get_test_store().await;
    let a = test_tenant();
    let b = test_tenant();
    let txn = TransactionId::new();

    store
        .put(test_record(&a, txn), PutOptions::expect_new())
        .await
        .unwrap();
    store
        .put(test_record(&b, txn), PutOptions::expect_new())
        .await
        .unwrap();

    assert!(store.delete(a.id, txn).await.unwrap());
    assert!(!store.exists(a.id, txn).await.unwrap());
    assert!(store.exists(b.id, txn).await.unwrap());
}

#[tokio::test]
async fn query_filters_for_sweeper() {
    let store = get_test_store().await;
    let tenant = test_tenant();
    let now = Utc::now();

    let mut expired = test_record(&tenant, TransactionId::new());
    expired.timeout_at = Some(now - Duration::seconds(5));
    store.put(expired.clone(), PutOptions::new()).await.unwrap();

    store
        .put(test_record(&tenant, TransactionId::new()), PutOptions::new())
        .await
        .unwrap();

    let mut finished = test_record(&tenant, TransactionId::new());
    finished.status = SagaStatus::Completed;
    finished.timeout_at = Some(now - Duration::seconds(5));
    finished.terminal_at = Some(now - Duration::hours(3));
    store.put(finished.clone(), PutOptions::new()).await.unwrap();

    let mut abandoned = test_record(&tenant, TransactionId::new());
    abandoned.status = SagaStatus::Failed;
    abandoned.compensation_incomplete = true;
    abandoned.terminal_at = Some(now - Duration::hours(3));
    store.put(abandoned.clone(), PutOptions::new()).await.unwrap();

    let timed_out = store.query(SagaQuery::timed_out(now)).await.unwrap();
    assert_eq!(timed_out.len(), 1);
    assert_eq!(timed_out[0].transaction_id, expired.transaction_id);

    let purgeable = store
        .query(SagaQuery::purgeable(now - Duration::hours(1)))
        .await
        .unwrap();
    assert_eq!(purgeable.len(), 1);
    assert_eq!(purgeable[0].transaction_id, finished.transaction_id);

    let incomplete = store
        .query(SagaQuery::for_tenant(tenant.id).compensation_incomplete(true))
        .await
        .unwrap();
    assert_eq!(incomplete.len(), 1);
    assert_eq!(incomplete[0].transaction_id, abandoned.transaction_id);

    let page = store
        .query(SagaQuery::for_tenant(tenant.id).limit(2).offset(1))
        .await
        .unwrap();
    assert_eq!(page.len(), 2);
}

#[tokio::test]
async fn query_stale_commands_and_unsent_outcomes() {
    let store = get_test_store().await;
    let tenant = test_tenant();
    let now = Utc::now().trunc_subsecs(3);

    let mut stale = test_record(&tenant, TransactionId::new());
    stale.awaiting_since = Some(now - Duration::minutes(2));
    store.put(stale.clone(), PutOptions::new()).await.unwrap();

    let mut fresh = test_record(&tenant, TransactionId::new());
    fresh.awaiting_since = Some(now);
    store.put(fresh, PutOptions::new()).await.unwrap();

    let mut unsent = test_record(&tenant, TransactionId::new());
    unsent.status = SagaStatus::Completed;
    unsent.outcome_pending = true;
    unsent.terminal_at = Some(now - Duration::hours(3));
    store.put(unsent.clone(), PutOptions::new()).await.unwrap();

    let resend = store
        .query(SagaQuery::stale(now - Duration::seconds(30)).tenant_id(tenant.id))
        .await
        .unwrap();
    assert_eq!(resend.len(), 1);
    assert_eq!(resend[0].transaction_id, stale.transaction_id);
    assert_eq!(resend[0].awaiting_since, stale.awaiting_since);

    let pending = store
        .query(SagaQuery::outcome_unsent().tenant_id(tenant.id))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].transaction_id, unsent.transaction_id);

    let purgeable = store
        .query(SagaQuery::purgeable(now - Duration::hours(1)).tenant_id(tenant.id))
        .await
        .unwrap();
    assert!(purgeable.is_empty());
}
