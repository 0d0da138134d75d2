use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Tenant, TenantId, TransactionId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, SagaQuery, SagaRecord, SagaStatus, StoreError,
    store::{PutOptions, SagaStore, StoredState, check_put},
};

const COLUMNS: &str = "tenant_id, transaction_id, region, major_version, minor_version, saga_type, status, \
     current_step_index, compensation_incomplete, outcome_pending, saga_data, version, created_at, updated_at, \
     timeout_at, terminal_at, awaiting_since";

/// PostgreSQL-backed saga store.
#[derive(Clone)]
pub struct PostgresSagaStore {
    pool: PgPool,
}

impl PostgresSagaStore {
    /// Creates a new PostgreSQL saga store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_record(row: PgRow) -> Result<SagaRecord> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<SagaStatus>()
            .map_err(|e| StoreError::InvalidStatus(e.0))?;

        Ok(SagaRecord {
            tenant: Tenant::new(
                TenantId::from_uuid(row.try_get::<Uuid, _>("tenant_id")?),
                row.try_get::<String, _>("region")?,
                row.try_get::<i32, _>("major_version")? as u16,
                row.try_get::<i32, _>("minor_version")? as u16,
            ),
            transaction_id: TransactionId::from_uuid(row.try_get::<Uuid, _>("transaction_id")?),
            saga_type: row.try_get("saga_type")?,
            status,
            current_step_index: row.try_get::<i32, _>("current_step_index")? as u32,
            compensation_incomplete: row.try_get("compensation_incomplete")?,
            outcome_pending: row.try_get("outcome_pending")?,
            data: row.try_get("saga_data")?,
            version: row.try_get("version")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
            timeout_at: row.try_get("timeout_at")?,
            terminal_at: row.try_get("terminal_at")?,
            awaiting_since: row.try_get("awaiting_since")?,
        })
    }
}

#[async_trait]
impl SagaStore for PostgresSagaStore {
    async fn put(&self, record: SagaRecord, options: PutOptions) -> Result<i64> {
        let tenant_id = record.tenant.id;
        let transaction_id = record.transaction_id;

        let mut tx = self.pool.begin().await?;

        let stored = sqlx::query(
            r#"
            SELECT version, status, current_step_index
            FROM sagas
            WHERE tenant_id = $1 AND transaction_id = $2
            FOR UPDATE
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(transaction_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .map(|row| -> Result<StoredState> {
            let status: String = row.try_get("status")?;
            Ok(StoredState {
                version: row.try_get("version")?,
                status: status
                    .parse()
                    .map_err(|e: crate::status::UnknownStatus| StoreError::InvalidStatus(e.0))?,
                current_step_index: row.try_get::<i32, _>("current_step_index")? as u32,
            })
        })
        .transpose()?;

        check_put(&record, stored, &options)?;
        let version = stored.map(|s| s.version).unwrap_or(0) + 1;

        let statement = if stored.is_some() {
            r#"
            UPDATE sagas SET
                region = $3, major_version = $4, minor_version = $5, saga_type = $6, status = $7,
                current_step_index = $8, compensation_incomplete = $9, saga_data = $10, version = $11,
                created_at = $12, updated_at = $13, timeout_at = $14, terminal_at = $15,
                outcome_pending = $16, awaiting_since = $17
            WHERE tenant_id = $1 AND transaction_id = $2
            "#
        } else {
            r#"
            INSERT INTO sagas (tenant_id, transaction_id, region, major_version, minor_version, saga_type,
                status, current_step_index, compensation_incomplete, saga_data, version, created_at,
                updated_at, timeout_at, terminal_at, outcome_pending, awaiting_since)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#
        };

        sqlx::query(statement)
            .bind(tenant_id.as_uuid())
            .bind(transaction_id.as_uuid())
            .bind(&record.tenant.region)
            .bind(i32::from(record.tenant.major_version))
            .bind(i32::from(record.tenant.minor_version))
            .bind(&record.saga_type)
            .bind(record.status.as_str())
            .bind(record.current_step_index as i32)
            .bind(record.compensation_incomplete)
            .bind(&record.data)
            .bind(version)
            .bind(record.created_at)
            .bind(record.updated_at)
            .bind(record.timeout_at)
            .bind(record.terminal_at)
            .bind(record.outcome_pending)
            .bind(record.awaiting_since)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                // A concurrent insert of the same key loses the race
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("sagas_pkey")
                {
                    return StoreError::VersionConflict {
                        tenant_id,
                        transaction_id,
                        expected: options.expected_version.unwrap_or(0),
                        actual: version,
                    };
                }
                StoreError::Database(e)
            })?;

        tx.commit().await?;
        tracing::debug!(%transaction_id, tenant = %tenant_id, version, "saga record stored");
        Ok(version)
    }

    async fn get(
        &self,
        tenant_id: TenantId,
        transaction_id: TransactionId,
    ) -> Result<Option<SagaRecord>> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM sagas WHERE tenant_id = $1 AND transaction_id = $2"
        ))
        .bind(tenant_id.as_uuid())
        .bind(transaction_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn delete(&self, tenant_id: TenantId, transaction_id: TransactionId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sagas WHERE tenant_id = $1 AND transaction_id = $2")
            .bind(tenant_id.as_uuid())
            .bind(transaction_id.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn query(&self, query: SagaQuery) -> Result<Vec<SagaRecord>> {
        let mut sql = format!("SELECT {COLUMNS} FROM sagas WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.tenant_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND tenant_id = ${param_count}"));
        }
        if query.statuses.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND status = ANY(${param_count})"));
        }
        if query.saga_type.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND saga_type = ${param_count}"));
        }
        if query.timed_out_at.is_some() {
            param_count += 1;
            sql.push_str(&format!(
                " AND status IN ('PENDING', 'COMPENSATING') AND timeout_at <= ${param_count}"
            ));
        }
        if query.terminal_before.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND terminal_at <= ${param_count}"));
        }
        if query.compensation_incomplete.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND compensation_incomplete = ${param_count}"));
        }
        if query.outcome_pending.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND outcome_pending = ${param_count}"));
        }
        if query.awaiting_before.is_some() {
            param_count += 1;
            sql.push_str(&format!(
                " AND status IN ('PENDING', 'COMPENSATING') AND awaiting_since <= ${param_count}"
            ));
        }

        sql.push_str(" ORDER BY created_at ASC, transaction_id ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(tenant_id) = query.tenant_id {
            sqlx_query = sqlx_query.bind(tenant_id.as_uuid());
        }
        if let Some(statuses) = query.statuses {
            let names: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
            sqlx_query = sqlx_query.bind(names);
        }
        if let Some(saga_type) = query.saga_type {
            sqlx_query = sqlx_query.bind(saga_type);
        }
        if let Some(now) = query.timed_out_at {
            sqlx_query = sqlx_query.bind(now);
        }
        if let Some(cutoff) = query.terminal_before {
            sqlx_query = sqlx_query.bind(cutoff);
        }
        if let Some(flag) = query.compensation_incomplete {
            sqlx_query = sqlx_query.bind(flag);
        }
        if let Some(flag) = query.outcome_pending {
            sqlx_query = sqlx_query.bind(flag);
        }
        if let Some(cutoff) = query.awaiting_before {
            sqlx_query = sqlx_query.bind(cutoff);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_record).collect()
    }
}
