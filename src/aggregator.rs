//! Bus subscriber that folds per-source readings into the global state.
//!
//! One task owns the `AggregatedState`; every inbound message replaces
//! that source's latest reading and triggers a recompute of the fused
//! label. Consumers see the result only through whole-value snapshots
//! published on a watch channel.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::bus::{Bus, BusMessage};
use crate::error::BusError;
use crate::fusion;
use crate::state::StateHandle;
use crate::types::{AggregatedState, Reading, Source};

pub struct Aggregator {
    bus: Arc<dyn Bus>,
    shutdown: CancellationToken,
    tx: watch::Sender<AggregatedState>,
}

impl Aggregator {
    pub fn new(bus: Arc<dyn Bus>, shutdown: CancellationToken) -> Aggregator {
        let (tx, _) = watch::channel(AggregatedState::new());
        Aggregator { bus, shutdown, tx }
    }

    /// Snapshot handle for downstream consumers. Valid before `run` and
    /// for as long as the aggregator lives.
    pub fn state_handle(&self) -> StateHandle {
        StateHandle::new(self.tx.subscribe())
    }

    /// Subscribe to every source topic and fold messages until shutdown.
    /// Retained messages replayed on subscription are processed like any
    /// other delivery.
    pub async fn run(self) -> Result<(), BusError> {
        let topics: Vec<&str> = Source::ALL.iter().map(|s| s.topic()).collect();
        let mut rx = self.bus.subscribe(&topics).await?;
        log::info!("aggregator: subscribed to {}", topics.join(", "));

        let mut state = AggregatedState::new();
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    log::info!("aggregator: shutting down");
                    return Ok(());
                }
                msg = rx.recv() => match msg {
                    Some(msg) => self.apply(&mut state, msg),
                    None if self.shutdown.is_cancelled() => return Ok(()),
                    None => return Err(BusError::Closed),
                }
            }
        }
    }

    fn apply(&self, state: &mut AggregatedState, msg: BusMessage) {
        let Some(source) = Source::from_topic(&msg.topic) else {
            log::warn!("aggregator: message on unknown topic {:?}", msg.topic);
            return;
        };
        let reading: Reading = match serde_json::from_slice(&msg.payload) {
            Ok(reading) => reading,
            Err(err) => {
                log::warn!("aggregator: malformed payload on {}: {err}", msg.topic);
                return;
            }
        };
        if reading.source != source {
            log::warn!(
                "aggregator: reading tagged {} arrived on topic {}, dropping",
                reading.source,
                msg.topic
            );
            return;
        }

        state.latest.insert(source, reading);
        state.global_emotion = fusion::fuse(&state.latest);
        state.updated_at = Utc::now();
        self.tx.send_replace(state.clone());
        log::debug!(
            "aggregator: {source} updated, global emotion now {}",
            state.global_emotion
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::memory::MemoryBus;
    use crate::bus::DeliveryLevel;
    use crate::types::Emotion;
    use serde_json::json;

    fn payload(source: Source, emotion: Emotion) -> Vec<u8> {
        serde_json::to_vec(&Reading::from_metrics(source, &json!({}), emotion)).expect("serialize")
    }

    fn harness() -> (Aggregator, AggregatedState) {
        let bus: Arc<dyn Bus> = Arc::new(MemoryBus::new());
        let aggregator = Aggregator::new(bus, CancellationToken::new());
        (aggregator, AggregatedState::new())
    }

    #[test]
    fn test_apply_updates_latest_and_recomputes() {
        let (aggregator, mut state) = harness();
        aggregator.apply(
            &mut state,
            BusMessage {
                topic: "pulse".to_string(),
                payload: payload(Source::Pulse, Emotion::Anxious),
            },
        );
        assert_eq!(state.latest.len(), 1);
        assert_eq!(state.global_emotion, Emotion::Anxious);
    }

    #[test]
    fn test_apply_ignores_unknown_topic() {
        let (aggregator, mut state) = harness();
        aggregator.apply(
            &mut state,
            BusMessage {
                topic: "noise".to_string(),
                payload: payload(Source::Pulse, Emotion::Calm),
            },
        );
        assert!(state.latest.is_empty());
        assert_eq!(state.global_emotion, Emotion::Neutral);
    }

    #[test]
    fn test_apply_ignores_malformed_payload() {
        let (aggregator, mut state) = harness();
        aggregator.apply(
            &mut state,
            BusMessage {
                topic: "weather".to_string(),
                payload: b"not json".to_vec(),
            },
        );
        assert!(state.latest.is_empty());
    }

    #[test]
    fn test_apply_ignores_source_topic_mismatch() {
        let (aggregator, mut state) = harness();
        aggregator.apply(
            &mut state,
            BusMessage {
                topic: "weather".to_string(),
                payload: payload(Source::Pulse, Emotion::Anxious),
            },
        );
        assert!(state.latest.is_empty());
    }

    #[test]
    fn test_interleaving_order_does_not_change_outcome() {
        let messages = [
            ("weather", payload(Source::Weather, Emotion::Happy)),
            ("transit", payload(Source::Transit, Emotion::Calm)),
            ("pulse", payload(Source::Pulse, Emotion::Anxious)),
        ];

        let mut outcomes = Vec::new();
        // every rotation of the arrival order
        for start in 0..messages.len() {
            let (aggregator, mut state) = harness();
            for i in 0..messages.len() {
                let (topic, payload) = &messages[(start + i) % messages.len()];
                aggregator.apply(
                    &mut state,
                    BusMessage {
                        topic: topic.to_string(),
                        payload: payload.clone(),
                    },
                );
            }
            outcomes.push(state.global_emotion);
        }
        assert!(outcomes.iter().all(|&e| e == Emotion::Anxious));
    }

    #[tokio::test]
    async fn test_run_consumes_retained_replay_on_subscribe() {
        let bus = Arc::new(MemoryBus::new());
        bus.publish(
            "weather",
            payload(Source::Weather, Emotion::Melancholic),
            DeliveryLevel::Retained,
        )
        .await
        .expect("publish");

        let shutdown = CancellationToken::new();
        let aggregator = Aggregator::new(bus.clone(), shutdown.clone());
        let mut handle = aggregator.state_handle();
        let task = tokio::spawn(aggregator.run());

        let state = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            handle.wait_for(|s| s.latest.contains_key(&Source::Weather)),
        )
        .await
        .expect("retained message should arrive")
        .expect("aggregator alive");

        assert_eq!(state.global_emotion, Emotion::Melancholic);
        assert!(state.latest[&Source::Weather].emotion == Emotion::Melancholic);

        shutdown.cancel();
        task.await.expect("join").expect("clean stop");
    }
}
