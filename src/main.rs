use tokio_util::sync::CancellationToken;

use citymood::bus::mqtt::MqttBus;
use citymood::config::Config;
use citymood::pipeline;
use citymood::types::Source;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // A broken config file is the one thing worth dying for; runtime
    // data problems all degrade instead
    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            log::error!("configuration error: {err}");
            std::process::exit(1);
        }
    };

    let shutdown = CancellationToken::new();
    let (bus, driver) = MqttBus::connect(&config.broker, shutdown.clone());
    let pipeline = pipeline::spawn(&config, bus, shutdown.clone());

    let topics: Vec<&str> = Source::ALL.iter().map(|s| s.topic()).collect();
    log::info!(
        "citymood running against {}:{}, topics: {}",
        config.broker.host,
        config.broker.port,
        topics.join(", ")
    );

    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("signal listener failed: {err}");
    }
    log::info!("shutdown requested");
    shutdown.cancel();

    for task in pipeline.tasks {
        let _ = task.await;
    }
    let _ = driver.await;
}
