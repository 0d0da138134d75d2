//! Unit-of-work buffer for outbound messages.
//!
//! A handler collects every message it wants to send into a
//! [`MessageBuffer`] while it mutates state, then the buffer is flushed once
//! at the end. Whether a failed unit of work still flushes is decided by
//! [`EmitMode`].

use common::Tenant;

use crate::envelope::RawEnvelope;
use crate::producer::{OutboundMessage, Producer, ProducerError};

/// What happens to buffered messages when the unit of work fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmitMode {
    /// Drop everything on error.
    #[default]
    Emit,
    /// Flush even on error; used when the buffer holds the error events.
    EmitAlways,
}

/// Messages accumulated during one handler invocation.
///
/// Not shared between handlers; each invocation owns its own buffer.
#[derive(Debug, Clone, Default)]
pub struct MessageBuffer {
    entries: Vec<(String, OutboundMessage)>,
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends every message the provider yields, addressed to `topic_name`.
    pub fn put<P>(&mut self, topic_name: &str, provider: P)
    where
        P: IntoIterator<Item = OutboundMessage>,
    {
        self.entries.extend(
            provider
                .into_iter()
                .map(|message| (topic_name.to_string(), message)),
        );
    }

    /// Appends one envelope keyed by the default partition key.
    pub fn put_one(&mut self, topic_name: &str, envelope: RawEnvelope) {
        self.put(topic_name, [OutboundMessage::new(envelope)]);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Buffered `(topic name, message)` pairs in insertion order.
    pub fn entries(&self) -> &[(String, OutboundMessage)] {
        &self.entries
    }

    /// Sends every entry in insertion order.
    ///
    /// Stops at the first producer error; entries sent before it stay sent.
    pub async fn flush(self, producer: &Producer, tenant: &Tenant) -> Result<usize, ProducerError> {
        let mut sent = 0;
        for (topic_name, message) in self.entries {
            sent += producer.produce(tenant, &topic_name, [message]).await?;
        }
        Ok(sent)
    }

    /// Finishes a unit of work whose result is `outcome`.
    ///
    /// On success the buffer is flushed and a flush failure replaces the
    /// outcome. On failure the buffer is dropped in [`EmitMode::Emit`] and
    /// flushed in [`EmitMode::EmitAlways`]; the original error is returned
    /// either way.
    pub async fn conclude<T, E>(
        self,
        mode: EmitMode,
        producer: &Producer,
        tenant: &Tenant,
        outcome: Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<ProducerError>,
    {
        match outcome {
            Ok(value) => {
                self.flush(producer, tenant).await?;
                Ok(value)
            }
            Err(error) => {
                match mode {
                    EmitMode::Emit => {
                        if !self.is_empty() {
                            metrics::counter!("messaging_buffer_dropped_total")
                                .increment(self.len() as u64);
                            tracing::debug!(dropped = self.len(), "discarding buffered messages");
                        }
                    }
                    EmitMode::EmitAlways => {
                        if let Err(flush_error) = self.flush(producer, tenant).await {
                            tracing::error!(error = %flush_error, "failed to flush buffer after error");
                        }
                    }
                }
                Err(error)
            }
        }
    }
}

/// Runs `f` against a fresh buffer and flushes it only if `f` succeeds.
pub async fn emit<T, E, F>(producer: &Producer, tenant: &Tenant, f: F) -> Result<T, E>
where
    F: FnOnce(&mut MessageBuffer) -> Result<T, E>,
    E: From<ProducerError>,
{
    let mut buffer = MessageBuffer::new();
    let outcome = f(&mut buffer);
    buffer
        .conclude(EmitMode::Emit, producer, tenant, outcome)
        .await
}

/// Runs `f` against a fresh buffer and flushes it whatever `f` returns.
pub async fn emit_always<T, E, F>(producer: &Producer, tenant: &Tenant, f: F) -> Result<T, E>
where
    F: FnOnce(&mut MessageBuffer) -> Result<T, E>,
    E: From<ProducerError>,
{
    let mut buffer = MessageBuffer::new();
    let outcome = f(&mut buffer);
    buffer
        .conclude(EmitMode::EmitAlways, producer, tenant, outcome)
        .await
}
