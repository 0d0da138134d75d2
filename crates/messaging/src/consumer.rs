//! Handler registration and record dispatch.
//!
//! The [`ConsumerManager`] owns, per logical topic, the list of registered
//! handlers. Every decoded record is offered to every handler on its topic;
//! each handler gates on the envelope `type` itself and returns
//! [`HandlerOutcome::Ignored`] for types it does not handle.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{Tenant, TenantId};
use futures_util::future::join_all;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::Instrument;
use uuid::Uuid;

use crate::codec::{CodecError, Decoded, Record, decode};
use crate::envelope::RawEnvelope;

/// What a handler did with an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// The envelope's type is not one this handler handles.
    Ignored,
    /// Handled; keep the handler registered.
    Handled,
    /// Handled; deregister the handler.
    Done,
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Handler failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// A consumer of decoded envelopes on one topic.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn handle(
        &self,
        tenant: &Tenant,
        envelope: &RawEnvelope,
    ) -> Result<HandlerOutcome, HandlerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(Uuid);

impl HandlerId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

struct Registration {
    id: HandlerId,
    scope: Option<TenantId>,
    handler: Arc<dyn Handler>,
}

/// Tallies of one dispatch, used by tests and logged at debug level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub handled: usize,
    pub ignored: usize,
    pub failed: usize,
    /// Handlers skipped because the record's tenant is outside their scope.
    pub rejected: usize,
    /// Handlers removed after returning [`HandlerOutcome::Done`].
    pub removed: usize,
    /// True when the record could not be decoded and reached no handler.
    pub malformed: bool,
}

/// Registered handlers keyed by logical topic name.
#[derive(Clone, Default)]
pub struct ConsumerManager {
    handlers: Arc<RwLock<HashMap<String, Vec<Registration>>>>,
}

impl ConsumerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler that receives envelopes of every tenant.
    pub async fn register(&self, topic_name: &str, handler: Arc<dyn Handler>) -> HandlerId {
        self.insert(topic_name, None, handler).await
    }

    /// Registers a handler that only accepts envelopes of `tenant`.
    pub async fn register_scoped(
        &self,
        topic_name: &str,
        tenant: TenantId,
        handler: Arc<dyn Handler>,
    ) -> HandlerId {
        self.insert(topic_name, Some(tenant), handler).await
    }

    async fn insert(
        &self,
        topic_name: &str,
        scope: Option<TenantId>,
        handler: Arc<dyn Handler>,
    ) -> HandlerId {
        let id = HandlerId::new();
        tracing::debug!(topic = %topic_name, handler = handler.name(), "handler registered");
        self.handlers
            .write()
            .await
            .entry(topic_name.to_string())
            .or_default()
            .push(Registration { id, scope, handler });
        id
    }

    /// Deregisters a handler. Returns false if it was already gone.
    pub async fn remove(&self, topic_name: &str, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write().await;
        let Some(registrations) = handlers.get_mut(topic_name) else {
            return false;
        };
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        let removed = registrations.len() < before;
        if registrations.is_empty() {
            handlers.remove(topic_name);
        }
        removed
    }

    pub async fn handler_count(&self, topic_name: &str) -> usize {
        self.handlers
            .read()
            .await
            .get(topic_name)
            .map_or(0, Vec::len)
    }

    /// Logical topics with at least one handler.
    pub async fn topics(&self) -> Vec<String> {
        let mut topics: Vec<_> = self.handlers.read().await.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Decodes a raw record and dispatches it.
    ///
    /// Malformed records are logged and counted; the caller still commits them.
    pub async fn dispatch_record(&self, topic_name: &str, record: &Record) -> DispatchReport {
        match decode(record) {
            Ok(decoded) => self.dispatch(topic_name, decoded).await,
            Err(e) => {
                metrics::counter!("messaging_malformed_envelopes_total", "topic" => topic_name.to_string())
                    .increment(1);
                tracing::warn!(topic = %topic_name, error = %e, "dropping malformed record");
                DispatchReport {
                    malformed: true,
                    ..Default::default()
                }
            }
        }
    }

    /// Offers a decoded envelope to every handler registered on the topic.
    ///
    /// Handlers run concurrently and the call returns once all of them have.
    /// Handler errors are logged, never propagated.
    pub async fn dispatch(&self, topic_name: &str, decoded: Decoded) -> DispatchReport {
        let span = tracing::info_span!(
            "dispatch",
            topic = %topic_name,
            tenant = %decoded.tenant.id,
            kind = %decoded.envelope.kind,
            span_id = decoded.span_id.as_deref().unwrap_or_default(),
        );

        async move {
            let mut report = DispatchReport::default();
            let mut targets = Vec::new();
            {
                let handlers = self.handlers.read().await;
                for registration in handlers.get(topic_name).into_iter().flatten() {
                    match registration.scope {
                        // Shared topics carry every tenant's traffic; skipping
                        // it is routine for scoped handlers.
                        Some(scope) if scope != decoded.tenant.id => {
                            report.rejected += 1;
                            tracing::debug!(
                                handler = registration.handler.name(),
                                expected = %scope,
                                "skipping envelope from another tenant"
                            );
                        }
                        _ => targets.push((registration.id, Arc::clone(&registration.handler))),
                    }
                }
            }

            let results = join_all(targets.iter().map(|(_, handler)| {
                handler.handle(&decoded.tenant, &decoded.envelope)
            }))
            .await;

            for ((id, handler), result) in targets.iter().zip(results) {
                match result {
                    Ok(HandlerOutcome::Ignored) => report.ignored += 1,
                    Ok(HandlerOutcome::Handled) => report.handled += 1,
                    Ok(HandlerOutcome::Done) => {
                        report.handled += 1;
                        if self.remove(topic_name, *id).await {
                            report.removed += 1;
                        }
                    }
                    Err(e) => {
                        report.failed += 1;
                        metrics::counter!("messaging_handler_errors_total", "topic" => topic_name.to_string())
                            .increment(1);
                        tracing::warn!(handler = handler.name(), error = %e, "handler failed");
                    }
                }
            }

            tracing::debug!(?report, "record dispatched");
            report
        }
        .instrument(span)
        .await
    }
}
