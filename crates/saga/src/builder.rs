//! Saga construction from code or from a wire definition.

use chrono::{DateTime, Duration, Utc};
use common::{Tenant, TransactionId};
use saga_store::SagaStatus;
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::error::Result;
use crate::model::{Saga, SagaType, Step};

/// Builds a validated saga with step ids `step_1..step_n` unless given.
#[derive(Debug, Clone)]
pub struct SagaBuilder {
    saga_type: SagaType,
    transaction_id: Option<TransactionId>,
    initiated_by: String,
    timeout_secs: Option<u64>,
    steps: Vec<(Option<String>, Action, Option<Action>)>,
}

impl SagaBuilder {
    pub fn new(saga_type: SagaType) -> Self {
        Self {
            saga_type,
            transaction_id: None,
            initiated_by: String::new(),
            timeout_secs: None,
            steps: Vec::new(),
        }
    }

    pub fn transaction_id(mut self, transaction_id: TransactionId) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }

    pub fn initiated_by(mut self, source: impl Into<String>) -> Self {
        self.initiated_by = source.into();
        self
    }

    /// Sets the saga's wall-clock budget. Zero disables it.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = (secs > 0).then_some(secs);
        self
    }

    /// Adds a step compensated by the action's natural inverse, if any.
    pub fn step(mut self, action: Action) -> Self {
        let compensation = action.inverse();
        self.steps.push((None, action, compensation));
        self
    }

    /// Adds a step with an explicit compensation, or none.
    pub fn step_with_compensation(mut self, action: Action, compensation: Option<Action>) -> Self {
        self.steps.push((None, action, compensation));
        self
    }

    /// Adds a step with a caller-chosen id.
    pub fn named_step(
        mut self,
        step_id: impl Into<String>,
        action: Action,
        compensation: Option<Action>,
    ) -> Self {
        self.steps.push((Some(step_id.into()), action, compensation));
        self
    }

    pub fn build(self, tenant: Tenant, now: DateTime<Utc>) -> Result<Saga> {
        let steps = self
            .steps
            .into_iter()
            .enumerate()
            .map(|(i, (step_id, action, compensation))| {
                let step_id = step_id.unwrap_or_else(|| format!("step_{}", i + 1));
                Step::new(step_id, action).with_compensation(compensation)
            })
            .collect();

        let saga = Saga {
            transaction_id: self.transaction_id.unwrap_or_default(),
            tenant,
            saga_type: self.saga_type,
            initiated_by: self.initiated_by,
            steps,
            current_step_index: 0,
            status: SagaStatus::Pending,
            failed_step_id: None,
            failure_reason: None,
            compensating_index: None,
            compensation_incomplete: false,
            failed_compensation_id: None,
            timeout_secs: self.timeout_secs,
            timeout_at: self.timeout_secs.map(|secs| now + Duration::seconds(secs as i64)),
            created_at: now,
            updated_at: now,
            terminal_at: None,
            outcome_pending: false,
            version: 0,
        };
        saga.validate()?;
        Ok(saga)
    }
}

/// A saga as submitted over HTTP or the saga command topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<TransactionId>,
    pub saga_type: SagaType,
    #[serde(default)]
    pub initiated_by: String,
    pub steps: Vec<StepDefinition>,
    /// Overrides the service default; 0 disables the timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    pub action: Action,
    /// Explicit compensation; the natural inverse is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation: Option<Action>,
    /// Marks the step irreversible even if the action has a natural inverse.
    #[serde(default)]
    pub no_compensation: bool,
}

impl SagaDefinition {
    /// Turns the definition into a builder, falling back to `default_timeout_secs`.
    pub fn into_builder(self, default_timeout_secs: u64) -> SagaBuilder {
        let mut builder = SagaBuilder::new(self.saga_type)
            .initiated_by(self.initiated_by)
            .timeout_secs(self.timeout_secs.unwrap_or(default_timeout_secs));
        if let Some(transaction_id) = self.transaction_id {
            builder = builder.transaction_id(transaction_id);
        }

        for (i, step) in self.steps.into_iter().enumerate() {
            let compensation = if step.no_compensation {
                None
            } else {
                step.compensation.or_else(|| step.action.inverse())
            };
            let step_id = step.step_id.unwrap_or_else(|| format!("step_{}", i + 1));
            builder = builder.named_step(step_id, step.action, compensation);
        }
        builder
    }
}
