//! MQTT bus session.
//!
//! One broker session shared by all publishers and the aggregator. A
//! single driver task polls the event loop, fans incoming publishes out
//! to local subscribers, and re-issues every subscription each time the
//! connection comes back, so an outage needs no manual intervention on
//! either the publishing or the subscribing side.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{Bus, BusMessage, DeliveryLevel, SUBSCRIBER_BUFFER};
use crate::config::BrokerConfig;
use crate::error::BusError;

/// Pause before re-polling the event loop after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Capacity of the client's pending-request channel.
const REQUEST_CAPACITY: usize = 32;

const KEEP_ALIVE: Duration = Duration::from_secs(30);

struct Subscriber {
    topics: HashSet<String>,
    tx: mpsc::Sender<BusMessage>,
}

pub struct MqttBus {
    client: AsyncClient,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl MqttBus {
    /// Open the broker session and spawn its driver task. The driver runs
    /// until `shutdown` fires, reconnecting indefinitely on failure.
    pub fn connect(
        config: &BrokerConfig,
        shutdown: CancellationToken,
    ) -> (Arc<MqttBus>, JoinHandle<()>) {
        let client_id = format!("{}-{}", config.client_id, Uuid::new_v4().simple());
        let mut options = MqttOptions::new(client_id, &config.host, config.port);
        options.set_keep_alive(KEEP_ALIVE);
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            options.set_credentials(user, pass);
        }

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let subscribers: Arc<Mutex<Vec<Subscriber>>> = Arc::new(Mutex::new(Vec::new()));
        let bus = Arc::new(MqttBus {
            client: client.clone(),
            subscribers: subscribers.clone(),
        });

        let driver = tokio::spawn(async move {
            let mut connected = false;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        let _ = client.disconnect().await;
                        log::info!("bus: session closed");
                        break;
                    }
                    event = eventloop.poll() => match event {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            log::info!("bus: connected to broker");
                            connected = true;
                            resubscribe(&client, &subscribers).await;
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            dispatch(&subscribers, &publish.topic, publish.payload.to_vec());
                        }
                        Ok(_) => {}
                        Err(err) => {
                            if connected {
                                log::warn!("bus: connection lost: {err}; retrying in {RECONNECT_DELAY:?}");
                            } else {
                                log::warn!("bus: connect failed: {err}; retrying in {RECONNECT_DELAY:?}");
                            }
                            connected = false;
                            tokio::time::sleep(RECONNECT_DELAY).await;
                        }
                    }
                }
            }
        });

        (bus, driver)
    }
}

/// Re-issue every registered subscription after a (re)connect. The broker
/// replays retained messages for each, which subscribers must tolerate.
async fn resubscribe(client: &AsyncClient, subscribers: &Mutex<Vec<Subscriber>>) {
    let topics: HashSet<String> = subscribers
        .lock()
        .iter()
        .flat_map(|s| s.topics.iter().cloned())
        .collect();
    for topic in topics {
        if let Err(err) = client.subscribe(&topic, QoS::AtLeastOnce).await {
            log::warn!("bus: resubscribe to {topic} failed: {err}");
        }
    }
}

fn dispatch(subscribers: &Mutex<Vec<Subscriber>>, topic: &str, payload: Vec<u8>) {
    let mut subs = subscribers.lock();
    subs.retain(|s| !s.tx.is_closed());
    for sub in subs.iter().filter(|s| s.topics.contains(topic)) {
        let message = BusMessage {
            topic: topic.to_string(),
            payload: payload.clone(),
        };
        if sub.tx.try_send(message).is_err() {
            log::debug!("bus: subscriber lagging on {topic}, dropping message");
        }
    }
}

#[async_trait]
impl Bus for MqttBus {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        delivery: DeliveryLevel,
    ) -> Result<(), BusError> {
        let qos = match delivery {
            DeliveryLevel::Retained => QoS::AtLeastOnce,
            DeliveryLevel::BestEffort => QoS::AtMostOnce,
        };
        self.client
            .publish(topic, qos, delivery.retains(), payload)
            .await
            .map_err(|err| BusError::Publish(err.to_string()))
    }

    async fn subscribe(&self, topics: &[&str]) -> Result<mpsc::Receiver<BusMessage>, BusError> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let topic_set: HashSet<String> = topics.iter().map(|t| t.to_string()).collect();
        self.subscribers.lock().push(Subscriber {
            topics: topic_set,
            tx,
        });

        for topic in topics {
            self.client
                .subscribe(*topic, QoS::AtLeastOnce)
                .await
                .map_err(|err| BusError::Subscribe(err.to_string()))?;
        }
        Ok(rx)
    }
}
