//! In-process change connection.
//!
//! Delivers published messages through the same channel contract as the NATS
//! connection. A nak schedules a redelivery with the delivery count bumped,
//! and every settlement is recorded so callers can inspect what happened.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::events::{Acker, BrokerError, ChangeConnection, ChangeEvent, ChangeMessage};

const CHANNEL_CAPACITY: usize = 64;

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Ack,
    Nak(Duration),
    Term,
}

/// A recorded settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub id: String,
    pub topic: String,
    pub deliveries: u64,
    pub action: Action,
}

#[derive(Default)]
struct Inner {
    topics: Mutex<HashMap<String, mpsc::Sender<ChangeEvent>>>,
    outcomes: Mutex<Vec<Outcome>>,
    fail_settlements: AtomicBool,
    closed: AtomicBool,
}

impl Inner {
    fn topics(&self) -> MutexGuard<'_, HashMap<String, mpsc::Sender<ChangeEvent>>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sender(&self, topic: &str) -> Option<mpsc::Sender<ChangeEvent>> {
        self.topics().get(topic).cloned()
    }

    fn record(&self, outcome: Outcome) {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(outcome);
    }
}

/// Change connection backed by in-process channels.
#[derive(Clone)]
pub struct MemoryConnection {
    inner: Arc<Inner>,
}

impl Default for MemoryConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::default()),
        }
    }

    /// Publish `message` on `topic` and return the delivery id.
    pub async fn publish(&self, topic: &str, message: &ChangeMessage) -> Result<String, BrokerError> {
        let payload = serde_json::to_vec(message).map_err(|e| BrokerError::Publish(e.to_string()))?;
        self.publish_raw(topic, payload).await
    }

    /// Publish an arbitrary payload on `topic` and return the delivery id.
    pub async fn publish_raw(&self, topic: &str, payload: Vec<u8>) -> Result<String, BrokerError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }

        let sender = self
            .inner
            .sender(topic)
            .ok_or_else(|| BrokerError::Publish(format!("no subscriber for topic {topic:?}")))?;

        let delivery = Delivery {
            id: uuid::Uuid::new_v4().to_string(),
            topic: topic.to_string(),
            timestamp: SystemTime::now(),
            deliveries: 1,
            payload,
        };
        let id = delivery.id.clone();

        sender
            .send(delivery.into_event(Arc::clone(&self.inner)))
            .await
            .map_err(|_| BrokerError::Closed)?;

        Ok(id)
    }

    /// Make every ack, nak and term fail until reset.
    pub fn fail_settlements(&self, fail: bool) {
        self.inner.fail_settlements.store(fail, Ordering::Release);
    }

    /// Settlements recorded so far, in order.
    pub fn outcomes(&self) -> Vec<Outcome> {
        self.inner
            .outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ChangeConnection for MemoryConnection {
    async fn subscribe_changes(&self, topic: &str) -> Result<mpsc::Receiver<ChangeEvent>, BrokerError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        self.inner.topics().insert(topic.to_string(), tx);

        Ok(rx)
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.topics().clear();
        Ok(())
    }
}

/// Everything needed to deliver a message again.
#[derive(Clone)]
struct Delivery {
    id: String,
    topic: String,
    timestamp: SystemTime,
    deliveries: u64,
    payload: Vec<u8>,
}

impl Delivery {
    fn into_event(self, inner: Arc<Inner>) -> ChangeEvent {
        let acker = MemoryAcker {
            inner,
            delivery: self.clone(),
        };

        ChangeEvent::new(self.topic, self.payload, Box::new(acker))
            .with_id(self.id)
            .with_source("memory")
            .with_timestamp(self.timestamp)
            .with_deliveries(self.deliveries)
    }
}

struct MemoryAcker {
    inner: Arc<Inner>,
    delivery: Delivery,
}

impl MemoryAcker {
    fn settle(&self, action: Action) -> Result<(), BrokerError> {
        if self.inner.fail_settlements.load(Ordering::Acquire) {
            return Err(BrokerError::Settle(format!(
                "settlement of {} rejected",
                self.delivery.id
            )));
        }

        self.inner.record(Outcome {
            id: self.delivery.id.clone(),
            topic: self.delivery.topic.clone(),
            deliveries: self.delivery.deliveries,
            action,
        });

        Ok(())
    }
}

#[async_trait]
impl Acker for MemoryAcker {
    async fn ack(&self) -> Result<(), BrokerError> {
        self.settle(Action::Ack)
    }

    async fn nak(&self, delay: Duration) -> Result<(), BrokerError> {
        self.settle(Action::Nak(delay))?;

        let mut redelivery = self.delivery.clone();
        redelivery.deliveries += 1;
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // the topic is gone once the connection closes
            let Some(sender) = inner.sender(&redelivery.topic) else {
                return;
            };
            let _ = sender.send(redelivery.into_event(Arc::clone(&inner))).await;
        });

        Ok(())
    }

    async fn term(&self) -> Result<(), BrokerError> {
        self.settle(Action::Term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;

    #[tokio::test]
    async fn test_publish_delivers_event() {
        let conn = MemoryConnection::new();
        let mut rx = conn.subscribe_changes("load-balancer").await.unwrap();

        let msg = ChangeMessage::new("loadbal-test", EventType::Create);
        let id = conn.publish("load-balancer", &msg).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.id, id);
        assert_eq!(event.topic, "load-balancer");
        assert_eq!(event.deliveries, 1);
        assert_eq!(event.decode().unwrap(), msg);
    }

    #[tokio::test]
    async fn test_nak_redelivers_with_bumped_count() {
        let conn = MemoryConnection::new();
        let mut rx = conn.subscribe_changes("load-balancer").await.unwrap();
        conn.publish_raw("load-balancer", b"{}".to_vec()).await.unwrap();

        let first = rx.recv().await.unwrap();
        first.nak(Duration::from_millis(1)).await.unwrap();

        let second = rx.recv().await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.deliveries, 2);

        second.term().await.unwrap();
        let actions: Vec<_> = conn.outcomes().into_iter().map(|o| o.action).collect();
        assert_eq!(actions, vec![Action::Nak(Duration::from_millis(1)), Action::Term]);
    }

    #[tokio::test]
    async fn test_failed_settlement_is_reported() {
        let conn = MemoryConnection::new();
        let mut rx = conn.subscribe_changes("load-balancer").await.unwrap();
        conn.publish_raw("load-balancer", Vec::new()).await.unwrap();
        conn.fail_settlements(true);

        let event = rx.recv().await.unwrap();
        assert!(matches!(event.ack().await, Err(BrokerError::Settle(_))));
        assert!(conn.outcomes().is_empty());
    }

    #[tokio::test]
    async fn test_close_ends_channels() {
        let conn = MemoryConnection::new();
        let mut rx = conn.subscribe_changes("load-balancer").await.unwrap();

        conn.close().await.unwrap();
        conn.close().await.unwrap();

        assert!(rx.recv().await.is_none());
        assert!(matches!(
            conn.publish_raw("load-balancer", Vec::new()).await,
            Err(BrokerError::Closed)
        ));
        assert!(matches!(
            conn.subscribe_changes("other").await,
            Err(BrokerError::Closed)
        ));
    }
}
