//! Consumer handlers that connect the orchestrator to the messaging fabric.

use std::sync::Arc;

use async_trait::async_trait;
use common::{Tenant, TransactionId};
use messaging::{
    ConsumerManager, Handler, HandlerError, HandlerOutcome, OneTimeWaiter, RawEnvelope,
};
use saga_store::SagaStore;

use crate::action::Domain;
use crate::builder::SagaDefinition;
use crate::emitter::{SAGA_COMPLETED, SAGA_FAILED, SAGA_STATUS_TOPIC};
use crate::error::SagaError;
use crate::orchestrator::SagaOrchestrator;

/// Topic on which other services ask the orchestrator to start sagas.
pub const SAGA_COMMAND_TOPIC: &str = "COMMAND_TOPIC_SAGA";

/// Envelope type of a saga creation request.
pub const CREATE_SAGA: &str = "CREATE";

/// Every domain status topic the orchestrator listens on.
pub fn status_topics() -> Vec<&'static str> {
    Domain::ALL.iter().map(|d| d.status_topic()).collect()
}

/// Every topic name the orchestrator resolves at startup.
pub fn required_topics() -> Vec<&'static str> {
    let mut topics: Vec<&'static str> = Domain::ALL
        .iter()
        .flat_map(|d| [d.command_topic(), d.status_topic()])
        .collect();
    topics.push(SAGA_COMMAND_TOPIC);
    topics.push(SAGA_STATUS_TOPIC);
    topics
}

/// Feeds one domain status topic into the reducer.
pub struct StatusEventHandler<S: SagaStore> {
    orchestrator: Arc<SagaOrchestrator<S>>,
    status_topic: &'static str,
    name: String,
}

impl<S: SagaStore> StatusEventHandler<S> {
    pub fn new(orchestrator: Arc<SagaOrchestrator<S>>, status_topic: &'static str) -> Self {
        Self {
            orchestrator,
            status_topic,
            name: format!("saga-status:{status_topic}"),
        }
    }
}

#[async_trait]
impl<S: SagaStore + 'static> Handler for StatusEventHandler<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(
        &self,
        tenant: &Tenant,
        envelope: &RawEnvelope,
    ) -> Result<HandlerOutcome, HandlerError> {
        match self
            .orchestrator
            .handle_status(tenant, self.status_topic, envelope)
            .await
        {
            Ok(outcome) if outcome.is_ignored() => Ok(HandlerOutcome::Ignored),
            Ok(_) => Ok(HandlerOutcome::Handled),
            Err(e) => Err(HandlerError::Failed(e.to_string())),
        }
    }
}

/// Starts sagas requested on the saga command topic.
pub struct SagaCommandHandler<S: SagaStore> {
    orchestrator: Arc<SagaOrchestrator<S>>,
}

impl<S: SagaStore> SagaCommandHandler<S> {
    pub fn new(orchestrator: Arc<SagaOrchestrator<S>>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl<S: SagaStore + 'static> Handler for SagaCommandHandler<S> {
    fn name(&self) -> &str {
        "saga-command"
    }

    async fn handle(
        &self,
        tenant: &Tenant,
        envelope: &RawEnvelope,
    ) -> Result<HandlerOutcome, HandlerError> {
        if envelope.kind != CREATE_SAGA {
            return Ok(HandlerOutcome::Ignored);
        }

        let mut definition: SagaDefinition = envelope.body_as()?;
        if definition.transaction_id.is_none() {
            definition.transaction_id = envelope.transaction_id;
        }

        match self
            .orchestrator
            .create_from_definition(tenant.clone(), definition)
            .await
        {
            Ok(_) => Ok(HandlerOutcome::Handled),
            // Redelivered request for a saga that is already running.
            Err(SagaError::AlreadyExists(transaction_id)) => {
                tracing::debug!(%transaction_id, "saga already exists, skipping create");
                Ok(HandlerOutcome::Handled)
            }
            Err(e) => Err(HandlerError::Failed(e.to_string())),
        }
    }
}

/// Registers the status handlers and the saga command handler.
pub async fn register_handlers<S: SagaStore + 'static>(
    manager: &ConsumerManager,
    orchestrator: &Arc<SagaOrchestrator<S>>,
) {
    for topic in status_topics() {
        let handler = StatusEventHandler::new(Arc::clone(orchestrator), topic);
        manager.register(topic, Arc::new(handler)).await;
    }
    manager
        .register(
            SAGA_COMMAND_TOPIC,
            Arc::new(SagaCommandHandler::new(Arc::clone(orchestrator))),
        )
        .await;
}

/// Waits for the terminal outcome of one of `tenant`'s sagas.
///
/// Register before creating the saga, or the outcome may be missed.
pub async fn await_outcome(
    manager: &ConsumerManager,
    tenant: &Tenant,
    transaction_id: TransactionId,
) -> OneTimeWaiter {
    manager
        .register_one_time(SAGA_STATUS_TOPIC, Some(tenant), move |envelope| {
            envelope.transaction_id == Some(transaction_id)
                && (envelope.kind == SAGA_COMPLETED || envelope.kind == SAGA_FAILED)
        })
        .await
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn required_topics_are_unique_and_complete() {
        let topics = required_topics();
        let unique: HashSet<_> = topics.iter().collect();

        assert_eq!(unique.len(), topics.len());
        assert_eq!(topics.len(), Domain::ALL.len() * 2 + 2);
        assert!(topics.contains(&"EVENT_TOPIC_CASH_COMPARTMENT_STATUS"));
        assert!(topics.contains(&SAGA_COMMAND_TOPIC));
    }
}
