mod config;
mod logging;
mod rumqttc_wrapper;

use anyhow::{bail, Context};
use clap::Parser;
use config::Config;
use rumqttc_wrapper::RumqttcWrapper;
use sermatec2mqtt::bridge::Bridge;
use sermatec2mqtt::coordinator::{Coordinator, CoordinatorConfig};
use sermatec2mqtt::home_assistant::HomeAssistant;
use sermatec2mqtt::metric_collector::MetricCollector;
use sermatec2mqtt::simple_mqtt::SimpleMqtt;
use sermatec2mqtt::simulator::SimulatedInverter;
use std::path::PathBuf;
use std::time::Duration;

use log::info;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Use the built-in simulated inverter
    #[arg(short, long)]
    fake: bool,

    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Log debug messages
    #[arg(short, long)]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    logging::init_logger(args.debug);
    info!("Running revision: {}", env!("GIT_HASH"));

    let config = Config::load(&args.config)?;
    let inverter = config
        .inverter_config()
        .context("invalid [inverter] configuration")?;

    // the wire protocol lives in a separate library that plugs in through
    // the Connector trait; only the simulator ships with the bridge
    if !args.fake {
        bail!(
            "no protocol backend for {}:{} is linked into this build, run with --fake to use the simulated inverter",
            inverter.host,
            inverter.port
        );
    }

    info!(
        "inverter: {}:{} (language {})",
        inverter.host, inverter.port, inverter.language
    );
    info!(
        "using update interval of {:.2}s",
        config.update_interval as f64 / 1000.
    );

    let mut output_channels: Vec<Box<dyn MetricCollector>> = Vec::new();
    if let Some(mqtt) = &config.home_assistant {
        info!("Publishing to Home Assistant at {}", mqtt.host);
        output_channels.push(Box::new(HomeAssistant::<RumqttcWrapper>::new(
            mqtt,
            inverter.language,
        )));
    }
    if let Some(mqtt) = &config.simple_mqtt {
        info!("Publishing to simple MQTT broker at {}", mqtt.host);
        output_channels.push(Box::new(SimpleMqtt::<RumqttcWrapper>::new(mqtt)));
    }

    let coordinator = Coordinator::new(
        SimulatedInverter::default(),
        inverter,
        CoordinatorConfig {
            update_interval: Duration::from_millis(config.update_interval),
            ..Default::default()
        },
    );
    Bridge::new(coordinator, output_channels).run();
    Ok(())
}
