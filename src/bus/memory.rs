//! In-process bus with broker-matching retained semantics.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{Bus, BusMessage, DeliveryLevel, SUBSCRIBER_BUFFER};
use crate::error::BusError;

struct Subscriber {
    topics: HashSet<String>,
    tx: mpsc::Sender<BusMessage>,
}

#[derive(Default)]
struct Inner {
    retained: HashMap<String, Vec<u8>>,
    subscribers: Vec<Subscriber>,
}

/// Process-local pub/sub. Delivery is immediate; a subscriber that falls
/// more than `SUBSCRIBER_BUFFER` messages behind loses the overflow, the
/// same accepted semantics as a broker outage.
#[derive(Default)]
pub struct MemoryBus {
    inner: Mutex<Inner>,
}

impl MemoryBus {
    pub fn new() -> MemoryBus {
        MemoryBus::default()
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        delivery: DeliveryLevel,
    ) -> Result<(), BusError> {
        let mut inner = self.inner.lock();
        if delivery.retains() {
            inner.retained.insert(topic.to_string(), payload.clone());
        }
        inner.subscribers.retain(|s| !s.tx.is_closed());
        for sub in inner.subscribers.iter().filter(|s| s.topics.contains(topic)) {
            let message = BusMessage {
                topic: topic.to_string(),
                payload: payload.clone(),
            };
            // A stalled subscriber drops messages rather than stalling
            // publishers
            let _ = sub.tx.try_send(message);
        }
        Ok(())
    }

    async fn subscribe(&self, topics: &[&str]) -> Result<mpsc::Receiver<BusMessage>, BusError> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let topics: HashSet<String> = topics.iter().map(|t| t.to_string()).collect();

        // Registration and retained replay happen under one lock so no
        // concurrent publish can slip between them
        let mut inner = self.inner.lock();
        for topic in &topics {
            if let Some(payload) = inner.retained.get(topic) {
                let _ = tx.try_send(BusMessage {
                    topic: topic.clone(),
                    payload: payload.clone(),
                });
            }
        }
        inner.subscribers.push(Subscriber { topics, tx });
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delivers_to_matching_subscriber_only() {
        let bus = MemoryBus::new();
        let mut weather_rx = bus.subscribe(&["weather"]).await.expect("subscribe");
        let mut pulse_rx = bus.subscribe(&["pulse"]).await.expect("subscribe");

        bus.publish("weather", b"w".to_vec(), DeliveryLevel::Retained)
            .await
            .expect("publish");

        let msg = weather_rx.recv().await.expect("message");
        assert_eq!(msg.topic, "weather");
        assert_eq!(msg.payload, b"w");
        assert!(pulse_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_retained_message_replays_to_late_subscriber() {
        let bus = MemoryBus::new();
        bus.publish("transit", b"t1".to_vec(), DeliveryLevel::Retained)
            .await
            .expect("publish");
        bus.publish("transit", b"t2".to_vec(), DeliveryLevel::Retained)
            .await
            .expect("publish");

        let mut rx = bus.subscribe(&["transit"]).await.expect("subscribe");
        let msg = rx.recv().await.expect("retained replay");
        assert_eq!(msg.payload, b"t2", "only the last value is retained");
    }

    #[tokio::test]
    async fn test_best_effort_is_not_replayed() {
        let bus = MemoryBus::new();
        bus.publish("pulse", b"p".to_vec(), DeliveryLevel::BestEffort)
            .await
            .expect("publish");

        let mut rx = bus.subscribe(&["pulse"]).await.expect("subscribe");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_multi_topic_subscription() {
        let bus = MemoryBus::new();
        let mut rx = bus
            .subscribe(&["weather", "transit", "pulse"])
            .await
            .expect("subscribe");

        bus.publish("pulse", b"p".to_vec(), DeliveryLevel::BestEffort)
            .await
            .expect("publish");
        bus.publish("weather", b"w".to_vec(), DeliveryLevel::Retained)
            .await
            .expect("publish");

        let first = rx.recv().await.expect("first");
        let second = rx.recv().await.expect("second");
        let topics: HashSet<String> = [first.topic, second.topic].into_iter().collect();
        assert!(topics.contains("pulse") && topics.contains("weather"));
    }
}
