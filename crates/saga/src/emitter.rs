//! Terminal outcome events on the saga status topic.

use messaging::key::key_for_transaction;
use messaging::{Envelope, MessageBuffer, OutboundMessage};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{Saga, SagaType};

pub const SAGA_STATUS_TOPIC: &str = "EVENT_TOPIC_SAGA_STATUS";
pub const SAGA_COMPLETED: &str = "SAGA_COMPLETED";
pub const SAGA_FAILED: &str = "SAGA_FAILED";

/// Body of `SAGA_COMPLETED` and `SAGA_FAILED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaOutcome {
    pub saga_type: SagaType,
    /// Last step that completed, or the step that failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub compensation_incomplete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_compensation_id: Option<String>,
}

/// Buffers `SAGA_COMPLETED`.
pub fn emit_completed(saga: &Saga, buffer: &mut MessageBuffer) -> Result<()> {
    let outcome = SagaOutcome {
        saga_type: saga.saga_type,
        step_id: saga.steps.last().map(|s| s.step_id.clone()),
        failed_step_id: None,
        reason: None,
        compensation_incomplete: false,
        failed_compensation_id: None,
    };
    put(saga, SAGA_COMPLETED, outcome, buffer)
}

/// Buffers `SAGA_FAILED`.
pub fn emit_failed(saga: &Saga, buffer: &mut MessageBuffer) -> Result<()> {
    let outcome = SagaOutcome {
        saga_type: saga.saga_type,
        step_id: saga.failed_step_id.clone(),
        failed_step_id: saga.failed_step_id.clone(),
        reason: saga.failure_reason.clone(),
        compensation_incomplete: saga.compensation_incomplete,
        failed_compensation_id: saga.failed_compensation_id.clone(),
    };
    put(saga, SAGA_FAILED, outcome, buffer)
}

fn put(saga: &Saga, kind: &str, outcome: SagaOutcome, buffer: &mut MessageBuffer) -> Result<()> {
    let envelope = Envelope::new(kind, outcome)
        .with_transaction(saga.transaction_id)
        .into_raw()?;
    buffer.put(
        SAGA_STATUS_TOPIC,
        [OutboundMessage::keyed(
            key_for_transaction(saga.transaction_id),
            envelope,
        )],
    );
    Ok(())
}
