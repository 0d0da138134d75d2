//! Kafka broker and consumer groups.
//!
//! Producers are idempotent with `acks=all`. Consumers commit manually after
//! every record has been offered to all handlers, including malformed
//! records, so poison pills never stall a partition.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use rdkafka::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Header, Headers as _, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{Broker, BrokerError};
use crate::codec::Record;
use crate::consumer::ConsumerManager;
use crate::tenant::Headers;
use crate::topic::TopicRegistry;

/// Configuration for Kafka connections.
#[derive(Clone, Debug)]
pub struct KafkaConfig {
    /// Kafka bootstrap servers (comma-separated).
    pub bootstrap_servers: String,
    /// Consumer group id shared by every topic this process consumes.
    pub group_id: String,
    /// Security protocol (PLAINTEXT, SSL, SASL_PLAINTEXT, SASL_SSL).
    pub security_protocol: Option<String>,
    /// SASL mechanism (PLAIN, SCRAM-SHA-256, SCRAM-SHA-512).
    pub sasl_mechanism: Option<String>,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
    /// SSL CA certificate path.
    pub ssl_ca_location: Option<String>,
    /// Per-send delivery timeout.
    pub send_timeout: Duration,
}

impl KafkaConfig {
    pub fn new(bootstrap_servers: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            group_id: group_id.into(),
            security_protocol: None,
            sasl_mechanism: None,
            sasl_username: None,
            sasl_password: None,
            ssl_ca_location: None,
            send_timeout: Duration::from_secs(5),
        }
    }

    /// Add SASL authentication.
    pub fn with_sasl(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
        mechanism: impl Into<String>,
    ) -> Self {
        self.sasl_username = Some(username.into());
        self.sasl_password = Some(password.into());
        self.sasl_mechanism = Some(mechanism.into());
        self.security_protocol.get_or_insert_with(|| "SASL_SSL".to_string());
        self
    }

    pub fn with_security_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.security_protocol = Some(protocol.into());
        self
    }

    pub fn with_ssl_ca(mut self, ca_location: impl Into<String>) -> Self {
        self.ssl_ca_location = Some(ca_location.into());
        self
    }

    fn producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        config.set("message.timeout.ms", self.send_timeout.as_millis().to_string());
        config.set("acks", "all");
        config.set("enable.idempotence", "true");
        self.apply_security(&mut config);
        config
    }

    fn consumer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        config.set("group.id", &self.group_id);
        config.set("enable.auto.commit", "false");
        config.set("auto.offset.reset", "earliest");
        self.apply_security(&mut config);
        config
    }

    fn apply_security(&self, config: &mut ClientConfig) {
        if let Some(ref protocol) = self.security_protocol {
            config.set("security.protocol", protocol);
        }
        if let Some(ref mechanism) = self.sasl_mechanism {
            config.set("sasl.mechanism", mechanism);
        }
        if let Some(ref username) = self.sasl_username {
            config.set("sasl.username", username);
        }
        if let Some(ref password) = self.sasl_password {
            config.set("sasl.password", password);
        }
        if let Some(ref ca_location) = self.ssl_ca_location {
            config.set("ssl.ca.location", ca_location);
        }
    }
}

/// Kafka-backed broker.
pub struct KafkaBroker {
    producer: FutureProducer,
    send_timeout: Duration,
}

impl KafkaBroker {
    pub fn new(config: &KafkaConfig) -> Result<Self, BrokerError> {
        let producer: FutureProducer = config.producer_config().create().map_err(|e| {
            BrokerError::Connection(format!("Failed to create Kafka producer: {e}"))
        })?;

        info!(bootstrap_servers = %config.bootstrap_servers, "connected Kafka producer");

        Ok(Self {
            producer,
            send_timeout: config.send_timeout,
        })
    }
}

#[async_trait]
impl Broker for KafkaBroker {
    async fn send(&self, record: Record) -> Result<(), BrokerError> {
        let mut headers = OwnedHeaders::new_with_capacity(record.headers.len());
        for (key, value) in &record.headers {
            headers = headers.insert(Header {
                key: key.as_str(),
                value: Some(value.as_bytes()),
            });
        }

        let mut future_record: FutureRecord<'_, [u8], [u8]> = FutureRecord::to(&record.topic)
            .payload(&record.payload[..])
            .headers(headers);
        if let Some(key) = record.key.as_deref() {
            future_record = future_record.key(key);
        }

        let (partition, offset) = self
            .producer
            .send(future_record, self.send_timeout)
            .await
            .map_err(|(e, _)| BrokerError::Send(format!("Failed to publish: {e}")))?;

        debug!(topic = %record.topic, partition, offset, "record published");
        Ok(())
    }
}

fn to_record(message: &BorrowedMessage<'_>) -> Record {
    let mut headers = Headers::new();
    if let Some(borrowed) = message.headers() {
        for header in borrowed.iter() {
            if let Some(value) = header.value {
                headers.insert(
                    header.key.to_string(),
                    String::from_utf8_lossy(value).into_owned(),
                );
            }
        }
    }

    Record {
        topic: message.topic().to_string(),
        key: message.key().map(<[u8]>::to_vec),
        payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        headers,
    }
}

/// Spawns one consumer for `(topic, group id)` feeding `manager`.
///
/// Records are dispatched one at a time, so per-partition order is the
/// order handlers observe. The task stops when `cancel` fires.
pub fn spawn_consumer(
    config: &KafkaConfig,
    topics: &TopicRegistry,
    topic_name: &str,
    manager: ConsumerManager,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>, BrokerError> {
    let physical = topics
        .resolve(topic_name)
        .map_err(|e| BrokerError::Subscribe(e.to_string()))?
        .to_string();

    let consumer: StreamConsumer = config.consumer_config().create().map_err(|e| {
        BrokerError::Connection(format!("Failed to create Kafka consumer: {e}"))
    })?;
    consumer
        .subscribe(&[physical.as_str()])
        .map_err(|e| BrokerError::Subscribe(format!("Failed to subscribe to {physical}: {e}")))?;

    info!(topic = %topic_name, physical = %physical, group_id = %config.group_id, "subscribed to Kafka topic");

    let consumer = Arc::new(consumer);
    let topic_name = topic_name.to_string();

    Ok(tokio::spawn(async move {
        let mut stream = consumer.stream();
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!(topic = %topic_name, "consumer shutting down");
                    break;
                }
                next = stream.next() => {
                    let Some(result) = next else { break };
                    match result {
                        Ok(message) => {
                            let record = to_record(&message);
                            manager.dispatch_record(&topic_name, &record).await;
                            if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                                error!(topic = %topic_name, error = %e, "failed to commit offset");
                            }
                        }
                        Err(e) => {
                            error!(topic = %topic_name, error = %e, "Kafka consumer error");
                        }
                    }
                }
            }
        }
    }))
}
