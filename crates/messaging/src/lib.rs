//! Messaging fabric for command and status topics.
//!
//! This crate provides:
//! - Typed envelopes with routing fields and a JSON codec carrying tenant headers
//! - Partition key derivation so every message for one actor stays in order
//! - A topic registry resolving logical names from the environment
//! - A producer and a unit-of-work message buffer
//! - A consumer manager dispatching to persistent and one-time handlers
//!
//! The Kafka broker lives behind the `kafka` feature; tests use
//! [`broker::InMemoryBroker`].

pub mod broker;
pub mod buffer;
pub mod codec;
pub mod consumer;
pub mod envelope;
pub mod key;
pub mod one_time;
pub mod producer;
pub mod tenant;
pub mod topic;

pub use broker::{Broker, BrokerError, InMemoryBroker};
pub use buffer::{EmitMode, MessageBuffer, emit, emit_always};
pub use codec::{CodecError, Decoded, Record, decode, encode};
pub use consumer::{ConsumerManager, DispatchReport, Handler, HandlerError, HandlerId, HandlerOutcome};
pub use envelope::{Envelope, RawEnvelope, Routing};
pub use key::partition_key;
pub use one_time::{OneTimeError, OneTimeWaiter};
pub use producer::{OutboundMessage, Producer, ProducerError};
pub use topic::{TopicError, TopicRegistry};
