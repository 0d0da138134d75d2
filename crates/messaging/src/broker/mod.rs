//! Broker abstraction.
//!
//! Producers write encoded [`Record`]s through a [`Broker`]; the in-memory
//! implementation backs tests and the Kafka implementation backs deployments.

use async_trait::async_trait;
use thiserror::Error;

use crate::codec::Record;

#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;

#[cfg(feature = "kafka")]
pub use kafka::{KafkaBroker, KafkaConfig, spawn_consumer};
pub use memory::InMemoryBroker;

/// Errors from the underlying broker client.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Send error: {0}")]
    Send(String),

    #[error("Subscribe error: {0}")]
    Subscribe(String),
}

/// Writes records to topics.
///
/// Implementations do not retry beyond what the client library does
/// internally; a returned error means the record may not have landed.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn send(&self, record: Record) -> Result<(), BrokerError>;
}
