//! Saga orchestrator service.
//!
//! Owns the registry and the producer, and runs every saga mutation as one
//! locked load-reduce-save-flush cycle. Messages produced while reducing are
//! buffered and only reach the broker once the new state is stored.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use common::{Tenant, TenantId, TransactionId};
use messaging::{EmitMode, MessageBuffer, Producer, RawEnvelope};
use saga_store::{SagaQuery, SagaStatus, SagaStore};
use tokio_util::sync::CancellationToken;

use crate::builder::SagaDefinition;
use crate::emitter;
use crate::error::{Result, SagaError};
use crate::executor;
use crate::model::Saga;
use crate::reducer::{self, IgnoreReason, ReduceOutcome};
use crate::registry::SagaRegistry;

/// Timing knobs for the orchestrator.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    /// Timeout applied to definitions that do not carry one; 0 disables it.
    pub default_timeout_secs: u64,
    /// In-flight commands older than this are re-sent by the recovery sweep.
    pub resend_after: Duration,
    /// How long terminal sagas are kept before purge.
    pub retention: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            default_timeout_secs: 300,
            resend_after: Duration::seconds(30),
            retention: Duration::minutes(60),
        }
    }
}

/// Counts from one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub timed_out: usize,
    pub resent: usize,
    pub outcomes_resent: usize,
    pub purged: usize,
}

/// Drives sagas from creation to their terminal outcome.
pub struct SagaOrchestrator<S: SagaStore> {
    registry: SagaRegistry<S>,
    producer: Producer,
    settings: OrchestratorSettings,
}

impl<S: SagaStore> SagaOrchestrator<S> {
    pub fn new(store: Arc<S>, producer: Producer, settings: OrchestratorSettings) -> Self {
        Self {
            registry: SagaRegistry::new(store),
            producer,
            settings,
        }
    }

    pub fn registry(&self) -> &SagaRegistry<S> {
        &self.registry
    }

    pub fn producer(&self) -> &Producer {
        &self.producer
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Stores a new saga and dispatches its first step.
    ///
    /// If the first command cannot be sent the saga is removed again and the
    /// producer error is returned.
    #[tracing::instrument(
        skip(self, saga),
        fields(
            transaction_id = %saga.transaction_id,
            tenant = %saga.tenant.id,
            saga_type = %saga.saga_type
        )
    )]
    pub async fn create_saga(&self, mut saga: Saga) -> Result<Saga> {
        saga.validate()?;
        let now = Utc::now();
        let tenant_id = saga.tenant.id;
        let transaction_id = saga.transaction_id;

        let _guard = self.registry.lock(tenant_id, transaction_id).await;

        let mut buffer = MessageBuffer::new();
        executor::dispatch_current(&mut saga, &mut buffer, now)?;
        self.registry.insert(&mut saga).await?;

        if let Err(e) = buffer.flush(&self.producer, &saga.tenant).await {
            tracing::error!(error = %e, "failed to dispatch first step, discarding saga");
            if let Err(delete_error) = self.registry.delete(tenant_id, transaction_id).await {
                tracing::error!(error = %delete_error, "failed to discard saga");
            }
            return Err(e.into());
        }

        metrics::counter!("saga_created_total").increment(1);
        tracing::info!(steps = saga.steps.len(), "saga created");
        Ok(saga)
    }

    /// Builds a saga from a submitted definition and creates it.
    pub async fn create_from_definition(
        &self,
        tenant: Tenant,
        definition: SagaDefinition,
    ) -> Result<Saga> {
        let saga = definition
            .into_builder(self.settings.default_timeout_secs)
            .build(tenant, Utc::now())?;
        self.create_saga(saga).await
    }

    /// Applies a status event received on `status_topic`.
    ///
    /// Events without a transaction id, or for transactions that are not
    /// sagas of this tenant, are ignored.
    #[tracing::instrument(
        skip(self, tenant, envelope),
        fields(tenant = %tenant.id, kind = %envelope.kind, transaction_id = tracing::field::Empty)
    )]
    pub async fn handle_status(
        &self,
        tenant: &Tenant,
        status_topic: &str,
        envelope: &RawEnvelope,
    ) -> Result<ReduceOutcome> {
        let Some(transaction_id) = envelope.transaction_id else {
            return Ok(ReduceOutcome::Ignored(IgnoreReason::UnknownSaga));
        };
        tracing::Span::current().record("transaction_id", tracing::field::display(transaction_id));

        let _guard = self.registry.lock(tenant.id, transaction_id).await;
        let Some(mut saga) = self.registry.get(tenant.id, transaction_id).await? else {
            return Ok(ReduceOutcome::Ignored(IgnoreReason::UnknownSaga));
        };

        let now = Utc::now();
        let mut buffer = MessageBuffer::new();
        let outcome = reducer::reduce(&mut saga, status_topic, envelope, &mut buffer, now);
        let outcome = self.save_and_flush(&mut saga, buffer, outcome).await?;
        observe(&saga, outcome, now);
        Ok(outcome)
    }

    pub async fn get_saga(&self, tenant_id: TenantId, transaction_id: TransactionId) -> Result<Saga> {
        self.registry
            .get(tenant_id, transaction_id)
            .await?
            .ok_or(SagaError::NotFound {
                tenant_id,
                transaction_id,
            })
    }

    /// Lists one tenant's sagas, oldest first.
    pub async fn list_sagas(
        &self,
        tenant_id: TenantId,
        status: Option<SagaStatus>,
    ) -> Result<Vec<Saga>> {
        let mut query = SagaQuery::for_tenant(tenant_id);
        if let Some(status) = status {
            query = query.status(status);
        }
        self.registry.query(query).await
    }

    /// Forces every saga whose timeout passed by `now` into failure handling.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_timeouts(&self, now: DateTime<Utc>) -> Result<usize> {
        let candidates = self.registry.query(SagaQuery::timed_out(now)).await?;
        let mut timed_out = 0;

        for candidate in candidates {
            match self.time_out_one(&candidate.tenant, candidate.transaction_id, now).await {
                Ok(true) => timed_out += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(
                    transaction_id = %candidate.transaction_id,
                    tenant = %candidate.tenant.id,
                    error = %e,
                    "failed to time out saga"
                ),
            }
        }

        Ok(timed_out)
    }

    async fn time_out_one(
        &self,
        tenant: &Tenant,
        transaction_id: TransactionId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let _guard = self.registry.lock(tenant.id, transaction_id).await;
        let Some(mut saga) = self.registry.get(tenant.id, transaction_id).await? else {
            return Ok(false);
        };
        if saga.is_terminal() || !saga.timeout_at.is_some_and(|at| at <= now) {
            return Ok(false);
        }

        tracing::info!(%transaction_id, tenant = %tenant.id, "saga timed out");
        let mut buffer = MessageBuffer::new();
        let outcome = reducer::time_out(&mut saga, &mut buffer, now);
        let outcome = self.save_and_flush(&mut saga, buffer, outcome).await?;
        if outcome.is_ignored() {
            return Ok(false);
        }

        metrics::counter!("saga_timeouts_total").increment(1);
        observe(&saga, outcome, now);
        Ok(true)
    }

    /// Re-sends in-flight commands attempted longer ago than `resend_after`.
    #[tracing::instrument(skip(self))]
    pub async fn resend_stale(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now - self.settings.resend_after;
        let candidates = self.registry.query(SagaQuery::stale(cutoff)).await?;
        let mut resent = 0;

        for candidate in candidates {
            match self.resend_one(&candidate.tenant, candidate.transaction_id, cutoff, now).await {
                Ok(true) => resent += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(
                    transaction_id = %candidate.transaction_id,
                    tenant = %candidate.tenant.id,
                    error = %e,
                    "failed to resend saga command"
                ),
            }
        }

        Ok(resent)
    }

    async fn resend_one(
        &self,
        tenant: &Tenant,
        transaction_id: TransactionId,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let _guard = self.registry.lock(tenant.id, transaction_id).await;
        let Some(mut saga) = self.registry.get(tenant.id, transaction_id).await? else {
            return Ok(false);
        };
        if !is_stale(&saga, cutoff) {
            return Ok(false);
        }

        let mut buffer = MessageBuffer::new();
        let resent = executor::resend(&mut saga, &mut buffer, now);
        let resent = match resent {
            Ok(true) => self.registry.put(&mut saga).await.map(|()| true),
            other => other,
        };
        let resent = buffer
            .conclude(EmitMode::Emit, &self.producer, tenant, resent)
            .await?;

        if resent {
            metrics::counter!("saga_resends_total").increment(1);
            tracing::info!(%transaction_id, tenant = %tenant.id, "in-flight command re-sent");
        }
        Ok(resent)
    }

    /// Sends the terminal event of every finished saga whose outcome never
    /// reached the broker.
    #[tracing::instrument(skip(self))]
    pub async fn resend_outcomes(&self) -> Result<usize> {
        let candidates = self.registry.query(SagaQuery::outcome_unsent()).await?;
        let mut resent = 0;

        for candidate in candidates {
            match self.resend_outcome_one(&candidate.tenant, candidate.transaction_id).await {
                Ok(true) => resent += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(
                    transaction_id = %candidate.transaction_id,
                    tenant = %candidate.tenant.id,
                    error = %e,
                    "failed to resend saga outcome"
                ),
            }
        }

        Ok(resent)
    }

    async fn resend_outcome_one(
        &self,
        tenant: &Tenant,
        transaction_id: TransactionId,
    ) -> Result<bool> {
        let _guard = self.registry.lock(tenant.id, transaction_id).await;
        let Some(mut saga) = self.registry.get(tenant.id, transaction_id).await? else {
            return Ok(false);
        };
        if !saga.is_terminal() || !saga.outcome_pending {
            return Ok(false);
        }

        let mut buffer = MessageBuffer::new();
        match saga.status {
            SagaStatus::Completed => emitter::emit_completed(&saga, &mut buffer)?,
            _ => emitter::emit_failed(&saga, &mut buffer)?,
        }
        buffer.flush(&self.producer, tenant).await?;
        self.confirm_outcome(&mut saga).await;

        metrics::counter!("saga_outcome_resends_total").increment(1);
        tracing::info!(%transaction_id, tenant = %tenant.id, status = %saga.status, "saga outcome re-sent");
        Ok(true)
    }

    /// Deletes terminal sagas that finished before the retention window.
    ///
    /// Sagas with an incomplete compensation are kept for operators.
    #[tracing::instrument(skip(self))]
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now - self.settings.retention;
        let expired = self.registry.query(SagaQuery::purgeable(cutoff)).await?;
        let mut purged = 0;

        for saga in expired {
            if self
                .registry
                .delete(saga.tenant.id, saga.transaction_id)
                .await?
            {
                purged += 1;
            }
        }

        if purged > 0 {
            metrics::counter!("saga_purged_total").increment(purged as u64);
            tracing::info!(purged, "expired sagas purged");
        }
        Ok(purged)
    }

    /// Operator purge of one terminal saga.
    #[tracing::instrument(skip(self))]
    pub async fn purge(&self, tenant_id: TenantId, transaction_id: TransactionId) -> Result<()> {
        let _guard = self.registry.lock(tenant_id, transaction_id).await;
        let saga = self.get_saga(tenant_id, transaction_id).await?;
        if !saga.is_terminal() {
            return Err(SagaError::Active(transaction_id));
        }

        self.registry.delete(tenant_id, transaction_id).await?;
        metrics::counter!("saga_purged_total").increment(1);
        tracing::info!(
            compensation_incomplete = saga.compensation_incomplete,
            "saga purged by operator"
        );
        Ok(())
    }

    /// Runs one timeout, recovery, outcome and purge pass.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let timed_out = self.sweep_timeouts(now).await?;
        let resent = self.resend_stale(now).await?;
        let outcomes_resent = self.resend_outcomes().await?;
        let purged = self.purge_expired(now).await?;
        self.registry.prune_locks().await;

        Ok(SweepReport {
            timed_out,
            resent,
            outcomes_resent,
            purged,
        })
    }

    /// Sweeps every `interval` until `cancel` fires.
    pub async fn run_sweeper(&self, interval: std::time::Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("saga sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    match self.sweep(Utc::now()).await {
                        Ok(report) if report != SweepReport::default() => {
                            tracing::debug!(?report, "sweep finished");
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "saga sweep failed"),
                    }
                }
            }
        }
    }

    /// Stores the reduced saga, then flushes or drops `buffer`.
    ///
    /// A terminal saga is stored with its outcome marked unsent; the mark is
    /// cleared once the flush succeeded, otherwise the sweep sends it later.
    async fn save_and_flush(
        &self,
        saga: &mut Saga,
        buffer: MessageBuffer,
        outcome: Result<ReduceOutcome>,
    ) -> Result<ReduceOutcome> {
        let outcome = match outcome {
            Ok(outcome) if outcome.is_ignored() => Ok(outcome),
            Ok(outcome) => self.registry.put(saga).await.map(|()| outcome),
            Err(e) => Err(e),
        };
        let tenant = saga.tenant.clone();
        let outcome = buffer
            .conclude(EmitMode::Emit, &self.producer, &tenant, outcome)
            .await?;

        if outcome.is_terminal() && saga.outcome_pending {
            self.confirm_outcome(saga).await;
        }
        Ok(outcome)
    }

    /// Clears the unsent-outcome mark after the terminal event was sent.
    async fn confirm_outcome(&self, saga: &mut Saga) {
        saga.outcome_pending = false;
        if let Err(e) = self.registry.put(saga).await {
            // The outcome is sent again by the next sweep.
            tracing::warn!(
                transaction_id = %saga.transaction_id,
                error = %e,
                "failed to record sent saga outcome"
            );
        }
    }
}

fn is_stale(saga: &Saga, cutoff: DateTime<Utc>) -> bool {
    saga.awaiting().is_some() && saga.awaiting_since().is_none_or(|at| at <= cutoff)
}

fn observe(saga: &Saga, outcome: ReduceOutcome, now: DateTime<Utc>) {
    match outcome {
        ReduceOutcome::Completed => {
            metrics::counter!("saga_completed_total").increment(1);
            record_duration(saga, now);
            tracing::info!(
                transaction_id = %saga.transaction_id,
                saga_type = %saga.saga_type,
                "saga completed"
            );
        }
        ReduceOutcome::Failed => {
            metrics::counter!("saga_failed_total").increment(1);
            record_duration(saga, now);
            tracing::info!(
                transaction_id = %saga.transaction_id,
                saga_type = %saga.saga_type,
                failed_step_id = saga.failed_step_id.as_deref().unwrap_or_default(),
                reason = saga.failure_reason.as_deref().unwrap_or_default(),
                compensation_incomplete = saga.compensation_incomplete,
                "saga failed"
            );
        }
        ReduceOutcome::Ignored(reason) => {
            metrics::counter!("saga_duplicate_events_total", "reason" => reason.as_str())
                .increment(1);
            tracing::debug!(
                transaction_id = %saga.transaction_id,
                reason = reason.as_str(),
                "status event ignored"
            );
        }
        ReduceOutcome::Compensating => {
            metrics::counter!("saga_compensations_total").increment(1);
        }
        ReduceOutcome::Advanced => {}
    }
}

fn record_duration(saga: &Saga, now: DateTime<Utc>) {
    let finished = saga.terminal_at.unwrap_or(now);
    let seconds = (finished - saga.created_at).num_milliseconds() as f64 / 1000.0;
    metrics::histogram!("saga_duration_seconds").record(seconds);
}
