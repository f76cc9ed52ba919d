use crate::entities::{state_values, EntityCatalogue};
use crate::home_assistant_config::{DeviceConfig, EntityConfig, Topics};
use crate::i18n::Language;
use crate::metric_collector::MetricCollector;
use crate::mqtt_config::MqttConfig;
use crate::mqtt_wrapper::{MqttWrapper, PublishEvent, QoS};
use crate::parameters::{ControlKind, ParameterSet, ParameterValue};
use crate::reading::{DeviceInfo, StructuredReading};
use log::{debug, error, info, warn};
use serde_json::Value;
use std::sync::mpsc::{channel, Receiver};

/// A control change requested from Home Assistant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlCommand {
    pub key: String,
    pub value: ParameterValue,
}

pub struct HomeAssistant<MQTT: MqttWrapper> {
    client: MQTT,
    commands_rx: Receiver<PublishEvent>,
    catalogue: EntityCatalogue,
    parameters: ParameterSet,
    topics: Option<Topics>,
    online: bool,
}

impl<MQTT: MqttWrapper> HomeAssistant<MQTT> {
    pub fn new(config: &MqttConfig, language: Language) -> Self {
        let (tx, rx) = channel();
        let client = MQTT::new(config, "-ha", tx);
        Self::from_client(client, rx, language)
    }

    /// Wraps an already connected client whose incoming publishes arrive on `rx`.
    pub fn from_client(client: MQTT, rx: Receiver<PublishEvent>, language: Language) -> Self {
        let parameters = ParameterSet::standard();
        Self {
            client,
            commands_rx: rx,
            catalogue: EntityCatalogue::new(language, &parameters),
            parameters,
            topics: None,
            online: false,
        }
    }

    pub fn client(&self) -> &MQTT {
        &self.client
    }

    fn publish_json(&mut self, topic: &str, payload: &Value) {
        debug!("Publishing to {topic} with payload {payload}");

        if let Err(e) = self
            .client
            .publish(topic, QoS::AtMostOnce, true, payload.to_string())
        {
            error!("Failed to publish message: {e:?}");
        }
    }

    fn publish_availability(&mut self, topics: &Topics, online: bool) {
        let payload = if online { "online" } else { "offline" };
        if let Err(e) = self
            .client
            .publish(topics.availability.as_str(), QoS::AtLeastOnce, true, payload)
        {
            error!("Failed to publish availability: {e:?}");
        }
        self.online = online;
    }

    fn publish_configs(&mut self, device: &DeviceInfo, topics: &Topics) {
        // configs let home assistant know which entities exist and where to find them
        let device_config = DeviceConfig::new(device);
        let configs: Vec<(String, EntityConfig)> = self
            .catalogue
            .iter()
            .map(|entity| {
                (
                    topics.config(entity),
                    EntityConfig::new(entity, device, &device_config, topics),
                )
            })
            .collect();

        for (topic, config) in configs {
            match serde_json::to_value(&config) {
                Ok(payload) => self.publish_json(&topic, &payload),
                Err(e) => error!("Failed to serialize config of {}: {e}", config.unique_id),
            }
        }
    }

    fn subscribe_commands(&mut self, topics: &Topics) {
        let command_topics: Vec<String> = self
            .catalogue
            .iter()
            .filter(|entity| entity.kind.is_control())
            .map(|entity| topics.command(&entity.key))
            .collect();

        for topic in command_topics {
            if let Err(e) = self.client.subscribe(&topic, QoS::AtLeastOnce) {
                warn!("subscription to {topic} failed: {e}");
            }
        }
    }

    fn parse_command(&self, topics: &Topics, event: &PublishEvent) -> Option<ControlCommand> {
        let key = topics.command_key(&event.topic)?;
        let payload = match std::str::from_utf8(&event.payload) {
            Ok(payload) => payload.trim(),
            Err(_) => {
                warn!("ignoring non-UTF-8 command on {}", event.topic);
                return None;
            }
        };
        let definition = match self.parameters.find(key) {
            Ok(definition) => definition,
            Err(e) => {
                warn!("ignoring command on {}: {e}", event.topic);
                return None;
            }
        };

        let value = match &definition.kind {
            ControlKind::Switch => match payload.to_ascii_uppercase().as_str() {
                "ON" => Some(ParameterValue::Switch(true)),
                "OFF" => Some(ParameterValue::Switch(false)),
                _ => None,
            },
            ControlKind::Select(_) => Some(ParameterValue::Option(payload.to_string())),
            // number entities send floats such as "6000.0"
            ControlKind::Number { .. } => payload
                .parse::<i64>()
                .ok()
                .or_else(|| {
                    payload
                        .parse::<f64>()
                        .ok()
                        .filter(|number| number.fract() == 0.0 && number.is_finite())
                        .map(|number| number as i64)
                })
                .map(ParameterValue::Number),
        };

        match value {
            Some(value) => Some(ControlCommand {
                key: key.to_string(),
                value,
            }),
            None => {
                warn!("ignoring malformed command '{payload}' for {key}");
                None
            }
        }
    }
}

impl<MQTT: MqttWrapper> MetricCollector for HomeAssistant<MQTT> {
    fn announce(&mut self, device: &DeviceInfo) {
        let topics = Topics::new(&device.serial);
        if self.topics.as_ref() == Some(&topics) {
            return;
        }
        info!("announcing {} entities of inverter {}", self.catalogue.len(), device.serial);

        self.subscribe_commands(&topics);
        self.publish_configs(device, &topics);
        // entities stay unavailable until real data arrives
        self.publish_availability(&topics, false);
        self.topics = Some(topics);
    }

    fn publish(&mut self, device: &DeviceInfo, reading: &StructuredReading) {
        self.announce(device);
        if reading.is_empty() {
            return;
        }
        let Some(topics) = self.topics.clone() else {
            return;
        };

        // states contain the actual data
        let payload = Value::Object(state_values(reading, &self.parameters));
        self.publish_json(&topics.state, &payload);
        if !self.online {
            self.publish_availability(&topics, true);
        }
    }

    fn unavailable(&mut self, device: &DeviceInfo) {
        self.announce(device);
        let Some(topics) = self.topics.clone() else {
            return;
        };
        if self.online {
            info!("inverter {} is unreachable, marking entities unavailable", device.serial);
            self.publish_availability(&topics, false);
        }
    }

    fn commands(&mut self) -> Vec<ControlCommand> {
        let events: Vec<PublishEvent> = self.commands_rx.try_iter().collect();
        let Some(topics) = self.topics.as_ref() else {
            if !events.is_empty() {
                warn!("dropping {} commands received before discovery", events.len());
            }
            return Vec::new();
        };

        events
            .iter()
            .filter_map(|event| self.parse_command(topics, event))
            .collect()
    }
}
