//! Producer to consumer round trips through the in-memory broker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{Tenant, TenantId, TransactionId};
use messaging::{
    ConsumerManager, Envelope, Handler, HandlerError, HandlerOutcome, InMemoryBroker,
    MessageBuffer, OutboundMessage, Producer, RawEnvelope, Routing, TopicRegistry, emit,
};
use serde_json::json;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

const COMMAND_TOPIC: &str = "COMMAND_TOPIC_CHARACTER";
const STATUS_TOPIC: &str = "EVENT_TOPIC_CHARACTER_STATUS";

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<(TenantId, String)>>,
}

#[async_trait]
impl Handler for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn handle(
        &self,
        tenant: &Tenant,
        envelope: &RawEnvelope,
    ) -> Result<HandlerOutcome, HandlerError> {
        if !envelope.is("CHANGE_MAP") {
            return Ok(HandlerOutcome::Ignored);
        }
        self.seen
            .lock()
            .await
            .push((tenant.id, envelope.kind.clone()));
        Ok(HandlerOutcome::Handled)
    }
}

fn setup() -> (Producer, InMemoryBroker, Arc<TopicRegistry>) {
    let topics = Arc::new(
        TopicRegistry::from_lookup([COMMAND_TOPIC, STATUS_TOPIC], |name| {
            Some(format!("atlas.{}", name.to_ascii_lowercase()))
        })
        .unwrap(),
    );
    let broker = InMemoryBroker::new();
    let producer = Producer::new(Arc::new(broker.clone()), Arc::clone(&topics));
    (producer, broker, topics)
}

async fn redeliver(manager: &ConsumerManager, topics: &TopicRegistry, broker: &InMemoryBroker) {
    for record in broker.take().await {
        let logical = topics.logical_name(&record.topic).unwrap().to_string();
        manager.dispatch_record(&logical, &record).await;
    }
}

fn change_map(character_id: u32) -> RawEnvelope {
    Envelope::new("CHANGE_MAP", json!({"characterId": character_id, "mapId": 100000000}))
        .with_routing(Routing::character(character_id))
}

#[tokio::test]
async fn produced_messages_reach_handlers_with_their_tenant() {
    let (producer, broker, topics) = setup();
    let manager = ConsumerManager::new();
    let recorder = Arc::new(Recorder::default());
    manager.register(COMMAND_TOPIC, recorder.clone()).await;

    let first = Tenant::new(TenantId::new(), "GMS", 83, 1);
    let second = Tenant::new(TenantId::new(), "JMS", 185, 1);
    producer
        .produce(&first, COMMAND_TOPIC, [OutboundMessage::new(change_map(1))])
        .await
        .unwrap();
    producer
        .produce(&second, COMMAND_TOPIC, [OutboundMessage::new(change_map(2))])
        .await
        .unwrap();

    let sent = broker.sent().await;
    assert_eq!(sent[0].topic, "atlas.command_topic_character");
    assert_eq!(sent[0].key_str(), Some("1"));

    redeliver(&manager, &topics, &broker).await;

    let seen = recorder.seen.lock().await.clone();
    assert_eq!(
        seen,
        vec![
            (first.id, "CHANGE_MAP".to_string()),
            (second.id, "CHANGE_MAP".to_string())
        ]
    );
}

#[tokio::test]
async fn failed_unit_of_work_sends_nothing() {
    let (producer, broker, _) = setup();
    let tenant = Tenant::new(TenantId::new(), "GMS", 83, 1);

    let result: Result<(), HandlerError> = emit(&producer, &tenant, |buffer: &mut MessageBuffer| {
        buffer.put_one(COMMAND_TOPIC, change_map(1));
        Err(HandlerError::Failed("inventory full".to_string()))
    })
    .await;

    assert!(result.is_err());
    assert_eq!(broker.count().await, 0);
}

#[tokio::test]
async fn one_time_waiter_resolves_from_a_produced_status_event() {
    let (producer, broker, topics) = setup();
    let manager = ConsumerManager::new();
    let tenant = Tenant::new(TenantId::new(), "GMS", 83, 1);
    let transaction_id = TransactionId::new();

    let waiter = manager
        .register_one_time(STATUS_TOPIC, Some(&tenant), move |e| {
            e.transaction_id == Some(transaction_id)
        })
        .await;

    let unrelated = Envelope::new("MAP_CHANGED", json!({})).with_transaction(TransactionId::new());
    let matching = Envelope::new("MAP_CHANGED", json!({})).with_transaction(transaction_id);
    producer
        .produce(
            &tenant,
            STATUS_TOPIC,
            [OutboundMessage::new(unrelated), OutboundMessage::new(matching)],
        )
        .await
        .unwrap();
    redeliver(&manager, &topics, &broker).await;

    let event = waiter
        .wait_timeout(&CancellationToken::new(), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(event.transaction_id, Some(transaction_id));
    assert_eq!(manager.handler_count(STATUS_TOPIC).await, 0);
}
