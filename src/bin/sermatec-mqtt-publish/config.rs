use std::{env, fs, path::Path};

use anyhow::{bail, Context};
use log::{info, warn};
use sermatec2mqtt::integration_config::{
    ConfigError, InverterConfig, InverterSettings, PortValue,
};
use sermatec2mqtt::mqtt_config::MqttConfig;
use serde_derive::Deserialize;

fn default_update_interval() -> u64 {
    30_000
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub inverter: InverterSettings,
    /// Milliseconds between two reads of the inverter
    #[serde(default = "default_update_interval")]
    pub update_interval: u64,
    pub home_assistant: Option<MqttConfig>,
    pub simple_mqtt: Option<MqttConfig>,
}

impl Config {
    /// Reads the TOML file at `path`, then applies environment overrides.
    /// A missing file is fine as long as the environment fills the gaps.
    pub fn load(path: &Path) -> anyhow::Result<Config> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => {
                info!("loading configuration from {}", path.display());
                contents
            }
            Err(e) => {
                warn!("Could not read {}: {e}", path.display());
                String::new()
            }
        };
        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("{} is not a valid configuration", path.display()))?;

        config.apply_overrides(|name| env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(host) = var("INVERTER_HOST") {
            self.inverter.host = host;
        }
        if let Some(port) = var("INVERTER_PORT") {
            self.inverter.port = Some(PortValue::Text(port));
        }
        if let Some(language) = var("INVERTER_LANGUAGE") {
            self.inverter.language = Some(language);
        }

        let host = var("MQTT_BROKER_HOST");
        let username = var("MQTT_USERNAME");
        let password = var("MQTT_PASSWORD");
        let port = var("MQTT_PORT");
        if host.is_none() && username.is_none() && password.is_none() && port.is_none() {
            return;
        }

        // the broker settings apply to every target, Home Assistant at least
        if self.home_assistant.is_none() {
            self.home_assistant = Some(MqttConfig::new(""));
        }
        for target in [&mut self.home_assistant, &mut self.simple_mqtt]
            .into_iter()
            .flatten()
        {
            if let Some(host) = &host {
                target.host = host.clone();
            }
            if let Some(username) = &username {
                target.username = Some(username.clone());
            }
            if let Some(password) = &password {
                target.password = Some(password.clone());
            }
            if let Some(port) = &port {
                match port.parse() {
                    Ok(port) => target.port = Some(port),
                    Err(_) => warn!("ignoring invalid MQTT_PORT '{port}'"),
                }
            }
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        let targets = [&self.home_assistant, &self.simple_mqtt];
        if targets.iter().all(|target| target.is_none()) {
            bail!("neither [home_assistant] nor [simple_mqtt] is configured");
        }
        for target in targets.into_iter().flatten() {
            if !target.is_valid() {
                bail!("MQTT target at '{}' is incomplete", target.host);
            }
        }
        if self.update_interval == 0 {
            bail!("update_interval must be positive");
        }
        Ok(())
    }

    pub fn inverter_config(&self) -> Result<InverterConfig, ConfigError> {
        InverterConfig::try_from(self.inverter.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const CONFIG: &str = r#"
        update_interval = 60000

        [inverter]
        host = "192.168.1.50"
        port = "8899"
        language = "cs"

        [home_assistant]
        host = "broker.lan"
    "#;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn parses_file() {
        let config: Config = toml::from_str(CONFIG).unwrap();
        config.validate().unwrap();
        assert_eq!(config.update_interval, 60_000);

        let inverter = config.inverter_config().unwrap();
        assert_eq!(inverter.host, "192.168.1.50");
        assert_eq!(inverter.port, 8899);
        assert_eq!(inverter.language.to_string(), "cs");
    }

    #[test]
    fn environment_overrides_the_file() {
        let mut config: Config = toml::from_str(CONFIG).unwrap();
        config.apply_overrides(vars(&[
            ("INVERTER_HOST", "10.0.0.9"),
            ("INVERTER_PORT", "9000"),
            ("MQTT_BROKER_HOST", "mosquitto"),
            ("MQTT_USERNAME", "bridge"),
            ("MQTT_PORT", "1884"),
        ]));

        let inverter = config.inverter_config().unwrap();
        assert_eq!(inverter.host, "10.0.0.9");
        assert_eq!(inverter.port, 9000);

        let mqtt = config.home_assistant.as_ref().unwrap();
        assert_eq!(mqtt.host, "mosquitto");
        assert_eq!(mqtt.username.as_deref(), Some("bridge"));
        assert_eq!(mqtt.port, Some(1884));
        assert!(config.simple_mqtt.is_none());
    }

    #[test]
    fn environment_alone_is_enough() {
        let mut config: Config = toml::from_str("").unwrap();
        config.apply_overrides(vars(&[
            ("INVERTER_HOST", "inverter.lan"),
            ("MQTT_BROKER_HOST", "mosquitto"),
        ]));
        config.validate().unwrap();
        assert_eq!(config.update_interval, 30_000);
        assert_eq!(config.inverter_config().unwrap().port, 8899);
    }

    #[test]
    fn a_target_is_required() {
        let config: Config = toml::from_str("[inverter]\nhost = \"x\"").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn legacy_inverter_keys_are_rejected() {
        let config: Config =
            toml::from_str("[inverter]\nip_address = \"192.168.1.50\"\n[simple_mqtt]\nhost = \"b\"")
                .unwrap();
        assert_eq!(
            config.inverter_config(),
            Err(ConfigError::LegacyKey("ip_address"))
        );
    }
}
