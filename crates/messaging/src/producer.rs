//! Topic-addressed producer.

use std::sync::Arc;

use common::Tenant;
use thiserror::Error;

use crate::broker::{Broker, BrokerError};
use crate::codec::{CodecError, encode};
use crate::envelope::RawEnvelope;
use crate::key::partition_key;
use crate::topic::{TopicError, TopicRegistry};

/// Errors surfaced to the caller of [`Producer::produce`].
///
/// Producers never retry; retrying is the caller's decision.
#[derive(Debug, Error)]
pub enum ProducerError {
    #[error(transparent)]
    Topic(#[from] TopicError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// One message destined for a topic: a partition key and an envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub key: Option<Vec<u8>>,
    pub envelope: RawEnvelope,
}

impl OutboundMessage {
    /// Keys the message with the router's default key for the envelope.
    pub fn new(envelope: RawEnvelope) -> Self {
        Self {
            key: partition_key(&envelope),
            envelope,
        }
    }

    pub fn keyed(key: Vec<u8>, envelope: RawEnvelope) -> Self {
        Self {
            key: Some(key),
            envelope,
        }
    }
}

/// Writes messages to logical topics through a broker.
#[derive(Clone)]
pub struct Producer {
    broker: Arc<dyn Broker>,
    topics: Arc<TopicRegistry>,
}

impl Producer {
    pub fn new(broker: Arc<dyn Broker>, topics: Arc<TopicRegistry>) -> Self {
        Self { broker, topics }
    }

    pub fn topics(&self) -> &TopicRegistry {
        &self.topics
    }

    /// Sends every message the provider yields to the topic named `topic_name`.
    ///
    /// Messages are sent in order; the first failure stops the batch and is
    /// returned. Returns the number of messages sent.
    pub async fn produce<P>(
        &self,
        tenant: &Tenant,
        topic_name: &str,
        provider: P,
    ) -> Result<usize, ProducerError>
    where
        P: IntoIterator<Item = OutboundMessage>,
    {
        let topic = self.topics.resolve(topic_name)?;
        let mut sent = 0;

        for message in provider {
            let record = encode(topic, message.key, &message.envelope, tenant)?;
            self.broker.send(record).await?;
            sent += 1;

            tracing::debug!(
                topic = %topic_name,
                kind = %message.envelope.kind,
                tenant = %tenant.id,
                "message produced"
            );
        }

        metrics::counter!("messaging_messages_produced_total", "topic" => topic_name.to_string())
            .increment(sent as u64);
        Ok(sent)
    }
}
