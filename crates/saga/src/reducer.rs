//! Status reducer: applies one status event to one saga.
//!
//! The event must come from the status topic of the awaited action's domain
//! and carry one of that action's outcome types. When the event echoes a
//! `stepId` it must name the awaited step (or its compensation). Without an
//! echoed `stepId`, a success whose body equals the stored result of the
//! previous step of the same action kind is taken as that step's redelivery.
//! Anything else is ignored, which makes redelivery harmless.

use chrono::{DateTime, Utc};
use messaging::{MessageBuffer, RawEnvelope};
use saga_store::SagaStatus;

use crate::action::Outcome;
use crate::compensator;
use crate::emitter;
use crate::error::Result;
use crate::executor;
use crate::model::{Saga, StepStatus};

/// Reason given to sagas forced into compensation by the sweeper.
pub const TIMEOUT_REASON: &str = "TIMEOUT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// No saga is stored under the event's transaction id.
    UnknownSaga,
    /// The saga already finished.
    Terminal,
    /// Nothing is in flight.
    NotAwaiting,
    /// The event came from another domain's status topic.
    ForeignTopic,
    /// The event type answers some other action.
    UnexpectedType,
    /// The echoed step id names a different step.
    StepMismatch,
    /// A success already applied to the previous step of the same kind.
    Redelivered,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoreReason::UnknownSaga => "unknown_saga",
            IgnoreReason::Terminal => "terminal",
            IgnoreReason::NotAwaiting => "not_awaiting",
            IgnoreReason::ForeignTopic => "foreign_topic",
            IgnoreReason::UnexpectedType => "unexpected_type",
            IgnoreReason::StepMismatch => "step_mismatch",
            IgnoreReason::Redelivered => "redelivered",
        }
    }
}

/// Observable effect of one reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOutcome {
    /// A step completed and the next one was dispatched.
    Advanced,
    /// The last step completed.
    Completed,
    /// A compensation was dispatched.
    Compensating,
    /// The saga finished as failed.
    Failed,
    Ignored(IgnoreReason),
}

impl ReduceOutcome {
    pub fn is_ignored(&self) -> bool {
        matches!(self, ReduceOutcome::Ignored(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReduceOutcome::Completed | ReduceOutcome::Failed)
    }
}

/// Applies a status event received on `status_topic`.
pub fn reduce(
    saga: &mut Saga,
    status_topic: &str,
    envelope: &RawEnvelope,
    buffer: &mut MessageBuffer,
    now: DateTime<Utc>,
) -> Result<ReduceOutcome> {
    if saga.is_terminal() {
        return Ok(ReduceOutcome::Ignored(IgnoreReason::Terminal));
    }
    let Some(awaiting) = saga.awaiting() else {
        return Ok(ReduceOutcome::Ignored(IgnoreReason::NotAwaiting));
    };

    let contract = awaiting.action.contract();
    if contract.domain.status_topic() != status_topic {
        return Ok(ReduceOutcome::Ignored(IgnoreReason::ForeignTopic));
    }
    let Some(outcome) = contract.classify(&envelope.kind) else {
        return Ok(ReduceOutcome::Ignored(IgnoreReason::UnexpectedType));
    };

    let index = awaiting.step_index;
    let compensation = awaiting.compensation;
    let step = &saga.steps[index];
    let expected_id = if compensation {
        step.compensation_id()
    } else {
        step.step_id.clone()
    };
    match envelope.body_str("stepId") {
        Some(echoed) if echoed != expected_id => {
            return Ok(ReduceOutcome::Ignored(IgnoreReason::StepMismatch));
        }
        None if !compensation
            && outcome == Outcome::Success
            && repeats_previous_result(saga, index, envelope) =>
        {
            return Ok(ReduceOutcome::Ignored(IgnoreReason::Redelivered));
        }
        _ => {}
    }

    match (compensation, outcome) {
        (false, Outcome::Success) => complete_step(saga, index, envelope, buffer, now),
        (false, Outcome::Failure) => {
            saga.steps[index].status = StepStatus::Failed;
            saga.touch(now);
            compensator::begin(saga, index, failure_reason(envelope), buffer, now)
        }
        (true, Outcome::Success) => {
            tracing::debug!(
                transaction_id = %saga.transaction_id,
                compensation_id = %expected_id,
                "compensation completed"
            );
            saga.steps[index].compensation_status = Some(StepStatus::Completed);
            saga.touch(now);
            compensator::continue_before(saga, index, buffer, now)
        }
        (true, Outcome::Failure) => {
            compensator::abandon(saga, index, failure_reason(envelope), buffer, now)
        }
    }
}

/// Whether `envelope` is the success already stored on the step before
/// `index`, which runs the same action kind.
fn repeats_previous_result(saga: &Saga, index: usize, envelope: &RawEnvelope) -> bool {
    let Some(previous) = index.checked_sub(1).map(|i| &saga.steps[i]) else {
        return false;
    };
    previous.is_completed()
        && previous.action.kind() == saga.steps[index].action.kind()
        && previous.result.as_ref() == Some(&envelope.body)
}

fn complete_step(
    saga: &mut Saga,
    index: usize,
    envelope: &RawEnvelope,
    buffer: &mut MessageBuffer,
    now: DateTime<Utc>,
) -> Result<ReduceOutcome> {
    let step = &mut saga.steps[index];
    step.status = StepStatus::Completed;
    step.completed_at = Some(now);
    step.result = Some(envelope.body.clone());
    tracing::debug!(
        transaction_id = %saga.transaction_id,
        step_id = %step.step_id,
        "step completed"
    );

    saga.current_step_index = index + 1;
    saga.touch(now);

    if saga.current_step_index < saga.steps.len() {
        executor::dispatch_current(saga, buffer, now)?;
        return Ok(ReduceOutcome::Advanced);
    }

    saga.finish(SagaStatus::Completed, now);
    emitter::emit_completed(saga, buffer)?;
    Ok(ReduceOutcome::Completed)
}

/// Forces the in-flight action to fail because the saga's budget expired.
///
/// A forward step starts compensation with reason `TIMEOUT`; an in-flight
/// compensation ends the saga with `compensation_incomplete`.
pub fn time_out(
    saga: &mut Saga,
    buffer: &mut MessageBuffer,
    now: DateTime<Utc>,
) -> Result<ReduceOutcome> {
    let Some(awaiting) = saga.awaiting() else {
        return Ok(ReduceOutcome::Ignored(IgnoreReason::NotAwaiting));
    };
    let index = awaiting.step_index;

    if awaiting.compensation {
        compensator::abandon(saga, index, TIMEOUT_REASON.to_string(), buffer, now)
    } else {
        saga.steps[index].status = StepStatus::Failed;
        saga.touch(now);
        compensator::begin(saga, index, TIMEOUT_REASON.to_string(), buffer, now)
    }
}

/// Picks a human-readable reason out of a failure event.
pub fn failure_reason(envelope: &RawEnvelope) -> String {
    ["reason", "code", "error"]
        .iter()
        .find_map(|field| envelope.body_str(field))
        .unwrap_or(envelope.kind.as_str())
        .to_string()
}
