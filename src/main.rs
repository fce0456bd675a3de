use smartthings_energy_bridge::{
    config::Config,
    schedule::{SystemClock, TokioSleeper},
    EnergyMonitor, MqttSink, SmartThingsAPI, SmartThingsMeter, StateStore, Timeouts,
};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("Starting...");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    use anyhow::Context;

    let api = SmartThingsAPI::new(&config.api_url, &config.api_token);
    let meter = SmartThingsMeter::connect(api, &config.device_name)
        .await
        .context("Can't find energy monitor device")?;
    info!(
        device_id = %meter.device().device_id,
        name = %config.device_name,
        "found energy monitor"
    );

    let sink = MqttSink::connect(&config.mqtt_host, config.mqtt_port, &config.mqtt_client_id);
    let timeouts = Timeouts {
        fetch: config.fetch_timeout,
        publish: config.publish_timeout,
    };
    let store = StateStore::new(&config.state_file);

    let mut monitor = EnergyMonitor::new(meter, sink, SystemClock, store, timeouts);
    monitor.run(&mut TokioSleeper).await;
    Ok(())
}
