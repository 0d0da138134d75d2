use chrono::Utc;
use common::{Tenant, TenantId, TransactionId};
use criterion::{Criterion, criterion_group, criterion_main};
use saga_store::{InMemorySagaStore, PutOptions, SagaQuery, SagaRecord, SagaStatus, SagaStore};

fn make_record(tenant: &Tenant, step_count: usize) -> SagaRecord {
    let now = Utc::now();
    let steps: Vec<_> = (1..=step_count)
        .map(|i| {
            serde_json::json!({
                "stepId": format!("step_{i}"),
                "status": "PENDING",
                "action": {"type": "award_mesos", "payload": {"characterId": 100, "worldId": 0, "amount": 1000}}
            })
        })
        .collect();
    SagaRecord {
        tenant: tenant.clone(),
        transaction_id: TransactionId::new(),
        saga_type: "QUEST_REWARD".to_string(),
        status: SagaStatus::Pending,
        current_step_index: 0,
        compensation_incomplete: false,
        outcome_pending: false,
        data: serde_json::json!({ "steps": steps }),
        version: 0,
        created_at: now,
        updated_at: now,
        timeout_at: None,
        terminal_at: None,
        awaiting_since: None,
    }
}

fn bench_put_new_saga(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let tenant = Tenant::new(TenantId::new(), "GMS", 83, 1);

    c.bench_function("saga_store/put_new_saga", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemorySagaStore::new();
                store
                    .put(make_record(&tenant, 4), PutOptions::expect_new())
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_put_get_cycle(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let tenant = Tenant::new(TenantId::new(), "GMS", 83, 1);
    let store = InMemorySagaStore::new();
    let record = make_record(&tenant, 4);
    let txn = record.transaction_id;
    rt.block_on(store.put(record, PutOptions::new())).unwrap();

    c.bench_function("saga_store/get_then_put", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut loaded = store.get(tenant.id, txn).await.unwrap().unwrap();
                let version = loaded.version;
                loaded.updated_at = Utc::now();
                store
                    .put(loaded, PutOptions::expect_version(version))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_query_active_1000(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let tenant = Tenant::new(TenantId::new(), "GMS", 83, 1);
    let store = InMemorySagaStore::new();
    rt.block_on(async {
        for i in 0..1000 {
            let mut record = make_record(&tenant, 2);
            if i % 2 == 0 {
                record.status = SagaStatus::Completed;
            }
            store.put(record, PutOptions::new()).await.unwrap();
        }
    });

    c.bench_function("saga_store/query_active_1000", |b| {
        b.iter(|| {
            rt.block_on(async {
                let active = store.query(SagaQuery::active()).await.unwrap();
                assert_eq!(active.len(), 500);
            });
        });
    });
}

criterion_group!(
    benches,
    bench_put_new_saga,
    bench_put_get_cycle,
    bench_query_active_1000
);
criterion_main!(benches);
