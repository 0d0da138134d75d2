//! One-time handlers: await the first envelope matching a predicate.
//!
//! ```ignore
//! let waiter = manager
//!     .register_one_time("EVENT_TOPIC_SAGA_STATUS", Some(&tenant), move |e| {
//!         e.transaction_id == Some(transaction_id)
//!     })
//!     .await;
//! let event = waiter.wait_timeout(&cancel, Duration::from_secs(30)).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::Tenant;
use thiserror::Error;
use tokio::sync::{Mutex, oneshot};
use tokio_util::sync::CancellationToken;

use crate::consumer::{ConsumerManager, Handler, HandlerError, HandlerId, HandlerOutcome};
use crate::envelope::RawEnvelope;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OneTimeError {
    #[error("Wait canceled")]
    Canceled,

    #[error("Timed out waiting for event")]
    TimedOut,

    /// The handler was removed without resolving.
    #[error("Handler closed without a result")]
    Closed,
}

type Validator = dyn Fn(&RawEnvelope) -> bool + Send + Sync;

struct OneTimeHandler {
    validator: Box<Validator>,
    sender: Mutex<Option<oneshot::Sender<RawEnvelope>>>,
}

#[async_trait]
impl Handler for OneTimeHandler {
    fn name(&self) -> &str {
        "one-time"
    }

    async fn handle(
        &self,
        _tenant: &Tenant,
        envelope: &RawEnvelope,
    ) -> Result<HandlerOutcome, HandlerError> {
        if !(self.validator)(envelope) {
            return Ok(HandlerOutcome::Ignored);
        }

        // A second match racing the deregistration finds the sender taken.
        let Some(sender) = self.sender.lock().await.take() else {
            return Ok(HandlerOutcome::Ignored);
        };
        // The waiter may have given up already; that is not an error.
        let _ = sender.send(envelope.clone());
        Ok(HandlerOutcome::Done)
    }
}

/// The receiving half of a one-time registration.
///
/// Dropping the waiter without awaiting leaves the handler registered until
/// it matches; call [`OneTimeWaiter::cancel`] to remove it eagerly.
pub struct OneTimeWaiter {
    id: HandlerId,
    topic_name: String,
    manager: ConsumerManager,
    receiver: oneshot::Receiver<RawEnvelope>,
}

impl OneTimeWaiter {
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Waits for the matching envelope or for `cancel`.
    ///
    /// Cancellation deregisters the handler.
    pub async fn wait(self, cancel: &CancellationToken) -> Result<RawEnvelope, OneTimeError> {
        let Self {
            id,
            topic_name,
            manager,
            receiver,
        } = self;

        tokio::select! {
            result = receiver => result.map_err(|_| OneTimeError::Closed),
            () = cancel.cancelled() => {
                manager.remove(&topic_name, id).await;
                Err(OneTimeError::Canceled)
            }
        }
    }

    /// Like [`wait`](Self::wait) with a deadline; expiry deregisters the handler.
    pub async fn wait_timeout(
        self,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Result<RawEnvelope, OneTimeError> {
        let (id, topic_name, manager) = (self.id, self.topic_name.clone(), self.manager.clone());
        match tokio::time::timeout(timeout, self.wait(cancel)).await {
            Ok(result) => result,
            Err(_) => {
                manager.remove(&topic_name, id).await;
                Err(OneTimeError::TimedOut)
            }
        }
    }

    /// Deregisters the handler without waiting.
    pub async fn cancel(self) {
        self.manager.remove(&self.topic_name, self.id).await;
    }
}

impl ConsumerManager {
    /// Registers a handler that resolves with the first envelope on
    /// `topic_name` for which `validator` returns true, then removes itself.
    ///
    /// With a tenant, envelopes of other tenants never reach the validator.
    pub async fn register_one_time<V>(
        &self,
        topic_name: &str,
        tenant: Option<&Tenant>,
        validator: V,
    ) -> OneTimeWaiter
    where
        V: Fn(&RawEnvelope) -> bool + Send + Sync + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let handler = Arc::new(OneTimeHandler {
            validator: Box::new(validator),
            sender: Mutex::new(Some(sender)),
        });

        let id = match tenant {
            Some(tenant) => self.register_scoped(topic_name, tenant.id, handler).await,
            None => self.register(topic_name, handler).await,
        };

        OneTimeWaiter {
            id,
            topic_name: topic_name.to_string(),
            manager: self.clone(),
            receiver,
        }
    }
}

#[cfg(test)]
mod tests {
    use common::{TenantId, TransactionId};
    use serde_json::json;

    use super::*;
    use crate::codec::Decoded;
    use crate::envelope::Envelope;

    fn tenant() -> Tenant {
        Tenant::new(TenantId::new(), "GMS", 83, 1)
    }

    fn event(kind: &str, txn: TransactionId, tenant: &Tenant) -> Decoded {
        Decoded {
            envelope: Envelope::new(kind, json!({})).with_transaction(txn),
            tenant: tenant.clone(),
            span_id: None,
        }
    }

    #[tokio::test]
    async fn resolves_on_first_match_and_deregisters() {
        let manager = ConsumerManager::new();
        let tenant = tenant();
        let txn = TransactionId::new();

        let waiter = manager
            .register_one_time("S", Some(&tenant), move |e| e.transaction_id == Some(txn))
            .await;

        manager.dispatch("S", event("SAGA_COMPLETED", TransactionId::new(), &tenant)).await;
        assert_eq!(manager.handler_count("S").await, 1);

        let report = manager.dispatch("S", event("SAGA_COMPLETED", txn, &tenant)).await;
        assert_eq!(report.removed, 1);
        assert_eq!(manager.handler_count("S").await, 0);

        let envelope = waiter.wait(&CancellationToken::new()).await.unwrap();
        assert_eq!(envelope.transaction_id, Some(txn));
    }

    #[tokio::test]
    async fn cancellation_deregisters() {
        let manager = ConsumerManager::new();
        let waiter = manager.register_one_time("S", None, |_| true).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(waiter.wait(&cancel).await, Err(OneTimeError::Canceled));
        assert_eq!(manager.handler_count("S").await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_deregisters() {
        let manager = ConsumerManager::new();
        let waiter = manager.register_one_time("S", None, |_| false).await;

        let result = waiter
            .wait_timeout(&CancellationToken::new(), Duration::from_secs(5))
            .await;

        assert_eq!(result, Err(OneTimeError::TimedOut));
        assert_eq!(manager.handler_count("S").await, 0);
    }

    #[tokio::test]
    async fn other_tenants_never_resolve_a_scoped_waiter() {
        let manager = ConsumerManager::new();
        let mine = tenant();
        let txn = TransactionId::new();
        let _waiter = manager
            .register_one_time("S", Some(&mine), move |e| e.transaction_id == Some(txn))
            .await;

        let report = manager.dispatch("S", event("SAGA_COMPLETED", txn, &tenant())).await;

        assert_eq!(report.rejected, 1);
        assert_eq!(manager.handler_count("S").await, 1);
    }
}
