//! Pipeline assembly: three publishers and one aggregator over a shared
//! bus.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::aggregator::Aggregator;
use crate::bus::Bus;
use crate::config::Config;
use crate::publisher::{delivery_for, run_publisher};
use crate::sources::pulse::PulseAdapter;
use crate::sources::transit::TransitAdapter;
use crate::sources::weather::WeatherAdapter;
use crate::sources::SourceAdapter;
use crate::state::StateHandle;

/// Running pipeline tasks plus the downstream state surface.
pub struct Pipeline {
    pub state: StateHandle,
    pub tasks: Vec<JoinHandle<()>>,
}

/// Spawn the aggregator and one publisher task per source on the current
/// runtime. All tasks stop when `shutdown` fires.
pub fn spawn(config: &Config, bus: Arc<dyn Bus>, shutdown: CancellationToken) -> Pipeline {
    let aggregator = Aggregator::new(bus.clone(), shutdown.clone());
    let state = aggregator.state_handle();

    let mut tasks = Vec::new();
    tasks.push(tokio::spawn(async move {
        if let Err(err) = aggregator.run().await {
            log::error!("aggregator: stopped: {err}");
        }
    }));

    let adapters: Vec<(Box<dyn SourceAdapter>, u64)> = vec![
        (
            Box::new(WeatherAdapter::new(config.weather.clone())),
            config.weather.poll_secs,
        ),
        (
            Box::new(TransitAdapter::new(config.transit.clone())),
            config.transit.poll_secs,
        ),
        (Box::new(PulseAdapter::new()), config.pulse.poll_secs),
    ];

    for (adapter, poll_secs) in adapters {
        let source = adapter.source();
        tasks.push(tokio::spawn(run_publisher(
            adapter,
            bus.clone(),
            Duration::from_secs(poll_secs),
            delivery_for(source),
            shutdown.clone(),
        )));
    }

    Pipeline { state, tasks }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::memory::MemoryBus;
    use crate::fusion;
    use crate::types::Source;

    /// Full loop over the in-process bus. Weather and transit have no
    /// credentials configured, so both degrade to fallback readings.
    /// The pipeline must still converge to a three-source state.
    #[tokio::test]
    async fn test_pipeline_converges_over_memory_bus() {
        let mut config = Config::default();
        config.weather.poll_secs = 1;
        config.transit.poll_secs = 1;
        config.pulse.poll_secs = 1;

        let bus = Arc::new(MemoryBus::new());
        let shutdown = CancellationToken::new();
        let pipeline = spawn(&config, bus, shutdown.clone());

        let mut state = pipeline.state.clone();
        let converged = tokio::time::timeout(
            Duration::from_secs(10),
            state.wait_for(|s| s.latest.len() == Source::ALL.len()),
        )
        .await
        .expect("pipeline should converge")
        .expect("aggregator alive");

        for source in Source::ALL {
            assert!(converged.latest.contains_key(&source), "{source} missing");
        }
        assert!(converged.latest[&Source::Weather].is_fallback);
        assert!(converged.latest[&Source::Transit].is_fallback);
        assert!(!converged.latest[&Source::Pulse].is_fallback);
        assert_eq!(converged.global_emotion, fusion::fuse(&converged.latest));

        shutdown.cancel();
        for task in pipeline.tasks {
            task.await.expect("task stops cleanly");
        }
    }
}
