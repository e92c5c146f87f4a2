//! Publisher loop: poll one adapter on its own cadence and emit each
//! reading on the source's topic.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::bus::{Bus, DeliveryLevel};
use crate::sources::SourceAdapter;
use crate::types::Source;

/// Delivery level appropriate to a source's cadence: the slow feeds
/// retain their last value for late subscribers, the fast pulse feed
/// does not.
pub fn delivery_for(source: Source) -> DeliveryLevel {
    match source {
        Source::Weather | Source::Transit => DeliveryLevel::Retained,
        Source::Pulse => DeliveryLevel::BestEffort,
    }
}

/// Drive one adapter forever: poll → serialize → publish → sleep.
///
/// Publish failures never terminate the loop: the next cycle retries,
/// and the period itself throttles the retry rate. Only the shutdown
/// token stops the task; an in-flight poll finishes first (its own
/// timeout bounds how long that takes).
pub async fn run_publisher(
    mut adapter: Box<dyn SourceAdapter>,
    bus: Arc<dyn Bus>,
    period: Duration,
    delivery: DeliveryLevel,
    shutdown: CancellationToken,
) {
    let source = adapter.source();
    let topic = source.topic();
    log::info!("{source} publisher: starting, period {period:?}");

    loop {
        let reading = adapter.poll().await;
        match serde_json::to_vec(&reading) {
            Ok(payload) => match bus.publish(topic, payload, delivery).await {
                Ok(()) => log::debug!(
                    "{source} publisher: published {}{}",
                    reading.emotion,
                    if reading.is_fallback { " (fallback)" } else { "" }
                ),
                Err(err) => log::warn!("{source} publisher: publish failed: {err}"),
            },
            Err(err) => log::warn!("{source} publisher: serialization failed: {err}"),
        }

        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = shutdown.cancelled() => {
                log::info!("{source} publisher: shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::memory::MemoryBus;
    use crate::sources::pulse::PulseAdapter;
    use crate::types::Reading;

    #[test]
    fn test_delivery_levels_by_source() {
        assert_eq!(delivery_for(Source::Weather), DeliveryLevel::Retained);
        assert_eq!(delivery_for(Source::Transit), DeliveryLevel::Retained);
        assert_eq!(delivery_for(Source::Pulse), DeliveryLevel::BestEffort);
    }

    #[tokio::test]
    async fn test_publisher_emits_decodable_readings_until_cancelled() {
        let bus = Arc::new(MemoryBus::new());
        let mut rx = bus.subscribe(&["pulse"]).await.expect("subscribe");

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_publisher(
            Box::new(PulseAdapter::new()),
            bus.clone(),
            Duration::from_millis(5),
            DeliveryLevel::BestEffort,
            shutdown.clone(),
        ));

        let msg = rx.recv().await.expect("published reading");
        assert_eq!(msg.topic, "pulse");
        let reading: Reading = serde_json::from_slice(&msg.payload).expect("valid JSON");
        assert_eq!(reading.source, Source::Pulse);

        shutdown.cancel();
        task.await.expect("publisher stops cleanly");
    }
}
