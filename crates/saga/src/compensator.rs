//! Compensation: undo completed steps in reverse, one at a time.
//!
//! Each compensation command is awaited through the reducer like a forward
//! step. A failed compensation ends the saga as FAILED with
//! `compensation_incomplete` set; nothing retries it.

use chrono::{DateTime, Duration, Utc};
use messaging::MessageBuffer;
use saga_store::SagaStatus;

use crate::emitter;
use crate::error::Result;
use crate::executor;
use crate::model::{Saga, StepStatus};
use crate::reducer::ReduceOutcome;

/// Moves a saga into COMPENSATING after the step at `failed_index` failed.
pub fn begin(
    saga: &mut Saga,
    failed_index: usize,
    reason: String,
    buffer: &mut MessageBuffer,
    now: DateTime<Utc>,
) -> Result<ReduceOutcome> {
    let failed_step_id = saga.steps[failed_index].step_id.clone();
    tracing::info!(
        transaction_id = %saga.transaction_id,
        step_id = %failed_step_id,
        %reason,
        "step failed, compensating"
    );

    saga.status = SagaStatus::Compensating;
    saga.failed_step_id = Some(failed_step_id);
    saga.failure_reason = Some(reason);
    saga.timeout_at = saga
        .timeout_secs
        .map(|secs| now + Duration::seconds(secs as i64));

    continue_before(saga, failed_index, buffer, now)
}

/// Dispatches the compensation of the nearest completed, compensable step
/// before `index`, or finishes the saga as FAILED when none remains.
pub fn continue_before(
    saga: &mut Saga,
    index: usize,
    buffer: &mut MessageBuffer,
    now: DateTime<Utc>,
) -> Result<ReduceOutcome> {
    saga.compensating_index = None;

    for candidate in (0..index).rev() {
        let step = &saga.steps[candidate];
        if !step.is_completed() {
            continue;
        }
        if step.compensation.is_none() {
            tracing::debug!(
                transaction_id = %saga.transaction_id,
                step_id = %step.step_id,
                "step is not compensable, skipping"
            );
            continue;
        }

        saga.compensating_index = Some(candidate);
        executor::dispatch_compensation(saga, candidate, buffer, now)?;
        return Ok(ReduceOutcome::Compensating);
    }

    saga.finish(SagaStatus::Failed, now);
    emitter::emit_failed(saga, buffer)?;
    Ok(ReduceOutcome::Failed)
}

/// Gives up after the compensation of the step at `index` failed.
pub fn abandon(
    saga: &mut Saga,
    index: usize,
    reason: String,
    buffer: &mut MessageBuffer,
    now: DateTime<Utc>,
) -> Result<ReduceOutcome> {
    let step = &mut saga.steps[index];
    step.compensation_status = Some(StepStatus::Failed);
    let compensation_id = step.compensation_id();

    tracing::warn!(
        transaction_id = %saga.transaction_id,
        tenant = %saga.tenant.id,
        %compensation_id,
        %reason,
        "compensation failed, saga requires manual resolution"
    );

    saga.compensation_incomplete = true;
    saga.failed_compensation_id = Some(compensation_id);
    saga.failure_reason.get_or_insert(reason);
    saga.finish(SagaStatus::Failed, now);
    emitter::emit_failed(saga, buffer)?;
    Ok(ReduceOutcome::Failed)
}
