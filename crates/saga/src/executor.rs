//! Step executor: turns the in-flight action into a command in a buffer.
//!
//! Nothing here awaits a reply; outcomes come back through the reducer.

use chrono::{DateTime, Utc};
use common::TransactionId;
use messaging::{Envelope, MessageBuffer, RawEnvelope, Routing};

use crate::action::Action;
use crate::error::Result;
use crate::model::{Saga, StepStatus};

/// Builds the command envelope for `action` on behalf of `step_id`; `None`
/// for await-only actions.
///
/// Routing fields are copied from the payload so the key router can keep the
/// command on the actor's partition.
pub fn command_envelope(
    transaction_id: TransactionId,
    action: &Action,
    step_id: &str,
) -> Result<Option<RawEnvelope>> {
    let Some(command_type) = action.contract().command_type else {
        return Ok(None);
    };
    let body = action.command_body(step_id)?;
    let routing = Routing::from_body(&body);
    Ok(Some(
        Envelope::new(command_type, body)
            .with_transaction(transaction_id)
            .with_routing(routing),
    ))
}

/// Buffers the command for the current step and stamps `attempted_at`.
///
/// Await-only steps are stamped without a command. Does nothing if the saga
/// has no pending current step.
pub fn dispatch_current(saga: &mut Saga, buffer: &mut MessageBuffer, now: DateTime<Utc>) -> Result<bool> {
    let transaction_id = saga.transaction_id;
    let Some(step) = saga.steps.get_mut(saga.current_step_index) else {
        return Ok(false);
    };
    if step.status != StepStatus::Pending {
        return Ok(false);
    }

    let topic = step.action.contract().domain.command_topic();
    match command_envelope(transaction_id, &step.action, &step.step_id)? {
        Some(envelope) => {
            buffer.put_one(topic, envelope);
            tracing::debug!(
                %transaction_id,
                step_id = %step.step_id,
                topic,
                "step command buffered"
            );
        }
        None => {
            tracing::debug!(
                %transaction_id,
                step_id = %step.step_id,
                "awaiting status without command"
            );
        }
    }
    step.attempted_at = Some(now);

    saga.touch(now);
    Ok(true)
}

/// Buffers the compensation command for the step at `index`.
pub fn dispatch_compensation(
    saga: &mut Saga,
    index: usize,
    buffer: &mut MessageBuffer,
    now: DateTime<Utc>,
) -> Result<bool> {
    let transaction_id = saga.transaction_id;
    let Some(step) = saga.steps.get_mut(index) else {
        return Ok(false);
    };
    let compensation_id = step.compensation_id();
    let Some(compensation) = step.compensation.as_mut() else {
        return Ok(false);
    };
    if let Some(result) = step.result.as_ref() {
        compensation.bind_result(result);
    }

    let Some(envelope) = command_envelope(transaction_id, compensation, &compensation_id)? else {
        return Ok(false);
    };
    let topic = compensation.contract().domain.command_topic();
    buffer.put_one(topic, envelope);
    step.compensation_status = Some(StepStatus::Pending);
    step.compensation_attempted_at = Some(now);

    tracing::debug!(%transaction_id, %compensation_id, topic, "compensation command buffered");
    saga.touch(now);
    Ok(true)
}

/// Re-buffers whatever command the saga is waiting on.
///
/// Used by recovery; domain handlers treat commands as idempotent per
/// transaction id. Await-only steps have nothing to resend.
pub fn resend(saga: &mut Saga, buffer: &mut MessageBuffer, now: DateTime<Utc>) -> Result<bool> {
    match saga.awaiting() {
        Some(awaiting) if !awaiting.action.contract().sends_command() => Ok(false),
        Some(awaiting) if awaiting.compensation => {
            let index = awaiting.step_index;
            dispatch_compensation(saga, index, buffer, now)
        }
        Some(_) => dispatch_current(saga, buffer, now),
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use common::{Tenant, TenantId};

    use super::*;
    use crate::action::{
        AwaitCharacterCreatedPayload, CreateAndEquipAssetPayload, CreateAssetPayload,
        ReserveItemPayload, SpawnMonsterPayload,
    };
    use crate::builder::SagaBuilder;
    use crate::model::SagaType;

    fn tenant() -> Tenant {
        Tenant::new(TenantId::new(), "GMS", 83, 1)
    }

    #[test]
    fn current_step_goes_to_its_domain_command_topic() {
        let now = Utc::now();
        let mut saga = SagaBuilder::new(SagaType::InventoryTransaction)
            .step(Action::ReserveItem(ReserveItemPayload {
                character_id: 100,
                template_id: 2000000,
                quantity: 1,
            }))
            .build(tenant(), now)
            .unwrap();
        let mut buffer = MessageBuffer::new();

        assert!(dispatch_current(&mut saga, &mut buffer, now).unwrap());

        let (topic, message) = &buffer.entries()[0];
        assert_eq!(topic, "COMMAND_TOPIC_INVENTORY");
        assert_eq!(message.key, Some(b"100".to_vec()));
        assert_eq!(message.envelope.kind, "REQUEST_RESERVE");
        assert_eq!(message.envelope.transaction_id, Some(saga.transaction_id));
        assert_eq!(message.envelope.body["stepId"], "step_1");
        assert_eq!(saga.steps[0].attempted_at, Some(now));
    }

    #[test]
    fn map_wide_commands_key_on_map() {
        let now = Utc::now();
        let mut saga = SagaBuilder::new(SagaType::QuestReward)
            .step(Action::SpawnMonster(SpawnMonsterPayload {
                world_id: 0,
                channel_id: 1,
                map_id: 100000000,
                monster_id: 100100,
                x: 0,
                y: 0,
                count: 1,
            }))
            .build(tenant(), now)
            .unwrap();
        let mut buffer = MessageBuffer::new();

        dispatch_current(&mut saga, &mut buffer, now).unwrap();
        assert_eq!(buffer.entries()[0].1.key, Some(b"100000000".to_vec()));
    }

    #[test]
    fn compensation_binds_forward_result() {
        let now = Utc::now();
        let mut saga = SagaBuilder::new(SagaType::InventoryTransaction)
            .step(Action::CreateAsset(CreateAssetPayload {
                character_id: 100,
                template_id: 1302000,
                quantity: 1,
                expiration: None,
            }))
            .build(tenant(), now)
            .unwrap();
        saga.steps[0].status = StepStatus::Completed;
        saga.steps[0].result = Some(serde_json::json!({"assetId": 9}));
        let mut buffer = MessageBuffer::new();

        assert!(dispatch_compensation(&mut saga, 0, &mut buffer, now).unwrap());

        let (topic, message) = &buffer.entries()[0];
        assert_eq!(topic, "COMMAND_TOPIC_ASSET");
        assert_eq!(message.envelope.kind, "DELETE");
        assert_eq!(message.envelope.body["assetId"], 9);
        assert_eq!(message.envelope.body["stepId"], "step_1-compensation");
        assert_eq!(saga.steps[0].compensation_status, Some(StepStatus::Pending));
    }

    #[test]
    fn await_only_step_is_stamped_without_a_command() {
        let now = Utc::now();
        let mut saga = SagaBuilder::new(SagaType::CharacterCreation)
            .step(Action::AwaitCharacterCreated(AwaitCharacterCreatedPayload {
                account_id: 7,
                world_id: 0,
                name: "Atlas".to_string(),
            }))
            .build(tenant(), now)
            .unwrap();
        let mut buffer = MessageBuffer::new();

        assert!(dispatch_current(&mut saga, &mut buffer, now).unwrap());
        assert!(buffer.is_empty());
        assert_eq!(saga.steps[0].attempted_at, Some(now));

        assert!(!resend(&mut saga, &mut buffer, now).unwrap());
        assert!(buffer.is_empty());
    }

    #[test]
    fn created_and_equipped_asset_is_destroyed_from_its_slot() {
        let now = Utc::now();
        let mut saga = SagaBuilder::new(SagaType::CharacterCreation)
            .step(Action::CreateAndEquipAsset(CreateAndEquipAssetPayload {
                character_id: 100,
                template_id: 1040002,
                quantity: 1,
                expiration: None,
            }))
            .build(tenant(), now)
            .unwrap();
        saga.steps[0].status = StepStatus::Completed;
        saga.steps[0].result = Some(serde_json::json!({"assetId": 3, "slot": -5}));
        let mut buffer = MessageBuffer::new();

        assert!(dispatch_compensation(&mut saga, 0, &mut buffer, now).unwrap());

        let (topic, message) = &buffer.entries()[0];
        assert_eq!(topic, "COMMAND_TOPIC_INVENTORY");
        assert_eq!(message.envelope.kind, "DESTROY_FROM_SLOT");
        assert_eq!(message.envelope.body["slot"], -5);
        assert_eq!(message.envelope.body["inventoryType"], 1);
    }
}
