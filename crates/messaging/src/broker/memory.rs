use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Broker, BrokerError};
use crate::codec::Record;

/// In-memory broker that records every sent record.
///
/// Can be told to fail sends, either always or after a number of successes,
/// to exercise producer error paths.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    records: Arc<RwLock<Vec<Record>>>,
    fail: Arc<AtomicBool>,
    fail_after: Arc<AtomicUsize>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent send fail (or succeed again).
    pub fn set_fail(&self, fail: bool) {
        self.fail_after.store(0, Ordering::SeqCst);
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Lets `successes` more sends through, then fails the rest.
    pub fn fail_after(&self, successes: usize) {
        self.fail_after.store(successes, Ordering::SeqCst);
        self.fail.store(true, Ordering::SeqCst);
    }

    /// Returns a copy of every record sent so far.
    pub async fn sent(&self) -> Vec<Record> {
        self.records.read().await.clone()
    }

    /// Removes and returns every record sent so far.
    pub async fn take(&self) -> Vec<Record> {
        std::mem::take(&mut *self.records.write().await)
    }

    /// Returns the number of records sent so far.
    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn send(&self, record: Record) -> Result<(), BrokerError> {
        if self.fail.load(Ordering::SeqCst) {
            let remaining = self.fail_after.load(Ordering::SeqCst);
            if remaining == 0 {
                return Err(BrokerError::Send(format!(
                    "broker unavailable for topic {}",
                    record.topic
                )));
            }
            self.fail_after.store(remaining - 1, Ordering::SeqCst);
        }

        self.records.write().await.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::Headers;

    fn record(topic: &str) -> Record {
        Record {
            topic: topic.to_string(),
            key: None,
            payload: b"{}".to_vec(),
            headers: Headers::new(),
        }
    }

    #[tokio::test]
    async fn records_sent_messages_in_order() {
        let broker = InMemoryBroker::new();
        broker.send(record("a")).await.unwrap();
        broker.send(record("b")).await.unwrap();

        let topics: Vec<_> = broker.take().await.into_iter().map(|r| r.topic).collect();
        assert_eq!(topics, vec!["a", "b"]);
        assert_eq!(broker.count().await, 0);
    }

    #[tokio::test]
    async fn fail_after_lets_some_sends_through() {
        let broker = InMemoryBroker::new();
        broker.fail_after(1);

        assert!(broker.send(record("a")).await.is_ok());
        assert!(broker.send(record("b")).await.is_err());
        assert_eq!(broker.count().await, 1);

        broker.set_fail(false);
        assert!(broker.send(record("c")).await.is_ok());
    }
}
