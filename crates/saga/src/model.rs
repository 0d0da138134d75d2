//! The saga aggregate and its steps.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use common::{Tenant, TransactionId};
use saga_store::{SagaRecord, SagaStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::Action;
use crate::error::{Result, SagaError};

/// Classifies what a saga is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaType {
    InventoryTransaction,
    QuestReward,
    TradeTransaction,
    CharacterCreation,
    StorageOperation,
    CashShopOperation,
    CharacterRespawn,
    GachaponTransaction,
    QuestStart,
    QuestComplete,
}

impl SagaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaType::InventoryTransaction => "INVENTORY_TRANSACTION",
            SagaType::QuestReward => "QUEST_REWARD",
            SagaType::TradeTransaction => "TRADE_TRANSACTION",
            SagaType::CharacterCreation => "CHARACTER_CREATION",
            SagaType::StorageOperation => "STORAGE_OPERATION",
            SagaType::CashShopOperation => "CASH_SHOP_OPERATION",
            SagaType::CharacterRespawn => "CHARACTER_RESPAWN",
            SagaType::GachaponTransaction => "GACHAPON_TRANSACTION",
            SagaType::QuestStart => "QUEST_START",
            SagaType::QuestComplete => "QUEST_COMPLETE",
        }
    }
}

impl std::fmt::Display for SagaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a step, or of a step's compensation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

/// One command dispatch plus its optional inverse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub step_id: String,
    pub action: Action,
    /// Absent for irreversible steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation: Option<Action>,
    pub status: StepStatus,
    /// Set once the compensation has been dispatched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation_status: Option<StepStatus>,
    /// Body of the success event, kept for compensation binding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default)]
    pub attempted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub compensation_attempted_at: Option<DateTime<Utc>>,
}

impl Step {
    /// Creates a pending step compensated by the action's natural inverse.
    pub fn new(step_id: impl Into<String>, action: Action) -> Self {
        let compensation = action.inverse();
        Self {
            step_id: step_id.into(),
            action,
            compensation,
            status: StepStatus::Pending,
            compensation_status: None,
            result: None,
            attempted_at: None,
            completed_at: None,
            compensation_attempted_at: None,
        }
    }

    pub fn with_compensation(mut self, compensation: Option<Action>) -> Self {
        self.compensation = compensation;
        self
    }

    /// Identifier of this step's compensation, used on the wire and in outcomes.
    pub fn compensation_id(&self) -> String {
        format!("{}-compensation", self.step_id)
    }

    pub fn is_completed(&self) -> bool {
        self.status == StepStatus::Completed
    }
}

/// A multi-step distributed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Saga {
    pub transaction_id: TransactionId,
    pub tenant: Tenant,
    pub saga_type: SagaType,
    #[serde(default)]
    pub initiated_by: String,
    pub steps: Vec<Step>,
    /// Index of the step in flight; equals `steps.len()` once every step completed.
    pub current_step_index: usize,
    pub status: SagaStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Step whose compensation is in flight while compensating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensating_index: Option<usize>,
    #[serde(default)]
    pub compensation_incomplete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_compensation_id: Option<String>,
    /// Wall-clock budget in seconds, restarted when compensation begins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub timeout_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub terminal_at: Option<DateTime<Utc>>,
    /// Set on reaching a terminal status, cleared once the outcome event is sent.
    #[serde(default)]
    pub outcome_pending: bool,
    /// Stored version this copy was loaded at (0 = never stored).
    #[serde(skip)]
    pub version: i64,
}

/// The action a saga is waiting on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Awaiting<'a> {
    pub step_index: usize,
    /// True when the awaited action is the step's compensation.
    pub compensation: bool,
    pub action: &'a Action,
}

impl Saga {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.steps.get(self.current_step_index)
    }

    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    /// Returns the in-flight action: the current step while pending, the
    /// compensation being run while compensating, nothing otherwise.
    pub fn awaiting(&self) -> Option<Awaiting<'_>> {
        match self.status {
            SagaStatus::Pending => {
                let step = self.current_step()?;
                (step.status == StepStatus::Pending).then_some(Awaiting {
                    step_index: self.current_step_index,
                    compensation: false,
                    action: &step.action,
                })
            }
            SagaStatus::Compensating => {
                let index = self.compensating_index?;
                let step = self.steps.get(index)?;
                let action = step.compensation.as_ref()?;
                (step.compensation_status == Some(StepStatus::Pending)).then_some(Awaiting {
                    step_index: index,
                    compensation: true,
                    action,
                })
            }
            SagaStatus::Completed | SagaStatus::Failed => None,
        }
    }

    /// When the in-flight command was last sent.
    pub fn awaiting_since(&self) -> Option<DateTime<Utc>> {
        let awaiting = self.awaiting()?;
        let step = &self.steps[awaiting.step_index];
        if awaiting.compensation {
            step.compensation_attempted_at
        } else {
            step.attempted_at
        }
    }

    /// Checks structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(SagaError::Invalid("saga has no steps".to_string()));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.step_id.trim().is_empty() {
                return Err(SagaError::Invalid("step id is empty".to_string()));
            }
            if !seen.insert(step.step_id.as_str()) {
                return Err(SagaError::Invalid(format!(
                    "duplicate step id {}",
                    step.step_id
                )));
            }
            if let Some(compensation) = &step.compensation
                && !compensation.contract().sends_command()
            {
                return Err(SagaError::Invalid(format!(
                    "compensation of step {} sends no command",
                    step.step_id
                )));
            }
        }

        if self.current_step_index > self.steps.len() {
            return Err(SagaError::Invalid(format!(
                "current step index {} out of range for {} steps",
                self.current_step_index,
                self.steps.len()
            )));
        }
        if let Some(index) = self.compensating_index
            && index >= self.steps.len()
        {
            return Err(SagaError::Invalid(format!(
                "compensating index {index} out of range"
            )));
        }

        Ok(())
    }

    /// Converts to the stored representation.
    pub fn to_record(&self) -> Result<SagaRecord> {
        Ok(SagaRecord {
            tenant: self.tenant.clone(),
            transaction_id: self.transaction_id,
            saga_type: self.saga_type.as_str().to_string(),
            status: self.status,
            current_step_index: u32::try_from(self.current_step_index).map_err(|_| {
                SagaError::Invalid(format!("step index {} too large", self.current_step_index))
            })?,
            compensation_incomplete: self.compensation_incomplete,
            outcome_pending: self.outcome_pending,
            data: serde_json::to_value(self)?,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
            timeout_at: self.timeout_at,
            terminal_at: self.terminal_at,
            awaiting_since: self.awaiting_since(),
        })
    }

    /// Rebuilds a saga from its stored representation.
    pub fn from_record(record: SagaRecord) -> Result<Self> {
        let mut saga: Saga = serde_json::from_value(record.data)?;
        saga.version = record.version;
        saga.outcome_pending = record.outcome_pending;
        Ok(saga)
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    pub(crate) fn finish(&mut self, status: SagaStatus, now: DateTime<Utc>) {
        self.status = status;
        self.compensating_index = None;
        self.timeout_at = None;
        self.terminal_at = Some(now);
        self.outcome_pending = true;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use common::TenantId;

    use super::*;
    use crate::action::{AwaitCharacterCreatedPayload, ConsumeItemPayload, ReserveItemPayload};

    fn saga() -> Saga {
        let now = Utc::now();
        Saga {
            transaction_id: TransactionId::new(),
            tenant: Tenant::new(TenantId::new(), "GMS", 83, 1),
            saga_type: SagaType::InventoryTransaction,
            initiated_by: "test".to_string(),
            steps: vec![
                Step::new(
                    "step_1",
                    Action::ReserveItem(ReserveItemPayload {
                        character_id: 100,
                        template_id: 2000000,
                        quantity: 1,
                    }),
                ),
                Step::new(
                    "step_2",
                    Action::ConsumeItem(ConsumeItemPayload {
                        character_id: 100,
                        slot: 3,
                    }),
                ),
            ],
            current_step_index: 0,
            status: SagaStatus::Pending,
            failed_step_id: None,
            failure_reason: None,
            compensating_index: None,
            compensation_incomplete: false,
            failed_compensation_id: None,
            timeout_secs: None,
            timeout_at: None,
            created_at: now,
            updated_at: now,
            terminal_at: None,
            outcome_pending: false,
            version: 0,
        }
    }

    #[test]
    fn step_defaults_to_natural_inverse() {
        let saga = saga();
        assert!(saga.steps[0].compensation.is_some());
        assert!(saga.steps[1].compensation.is_none());
    }

    #[test]
    fn validate_rejects_duplicates_and_bad_indices() {
        let mut duplicate = saga();
        duplicate.steps[1].step_id = "step_1".to_string();
        assert!(matches!(duplicate.validate(), Err(SagaError::Invalid(_))));

        let mut out_of_range = saga();
        out_of_range.current_step_index = 3;
        assert!(out_of_range.validate().is_err());

        let mut empty = saga();
        empty.steps.clear();
        assert!(empty.validate().is_err());

        assert!(saga().validate().is_ok());
    }

    #[test]
    fn validate_rejects_compensation_without_command() {
        let mut saga = saga();
        saga.steps[0].compensation = Some(Action::AwaitCharacterCreated(
            AwaitCharacterCreatedPayload {
                account_id: 7,
                world_id: 0,
                name: "Atlas".to_string(),
            },
        ));
        assert!(matches!(saga.validate(), Err(SagaError::Invalid(_))));
    }

    #[test]
    fn awaiting_follows_status() {
        let mut saga = saga();
        assert_eq!(saga.awaiting().unwrap().step_index, 0);

        saga.status = SagaStatus::Compensating;
        saga.compensating_index = Some(0);
        saga.steps[0].compensation_status = Some(StepStatus::Pending);
        let awaiting = saga.awaiting().unwrap();
        assert!(awaiting.compensation);

        saga.status = SagaStatus::Failed;
        assert!(saga.awaiting().is_none());
    }

    #[test]
    fn record_conversion_keeps_indexed_columns_in_sync() {
        let mut saga = saga();
        saga.current_step_index = 1;
        saga.version = 4;

        let record = saga.to_record().unwrap();
        assert_eq!(record.current_step_index, 1);
        assert_eq!(record.saga_type, "INVENTORY_TRANSACTION");
        assert_eq!(record.data["steps"][0]["action"]["type"], "reserve_item");
        assert_eq!(record.awaiting_since, None);

        let restored = Saga::from_record(record).unwrap();
        assert_eq!(restored, saga);
    }

    #[test]
    fn record_carries_in_flight_send_time_and_unsent_outcome() {
        let mut saga = saga();
        let sent = Utc::now();
        saga.steps[0].attempted_at = Some(sent);
        assert_eq!(saga.to_record().unwrap().awaiting_since, Some(sent));

        saga.finish(SagaStatus::Completed, sent);
        let record = saga.to_record().unwrap();
        assert!(record.outcome_pending);
        assert_eq!(record.awaiting_since, None);
    }
}
