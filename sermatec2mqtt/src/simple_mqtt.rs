use crate::{
    entities::state_values,
    metric_collector::MetricCollector,
    mqtt_config::MqttConfig,
    mqtt_wrapper::{MqttWrapper, QoS},
    parameters::ParameterSet,
    reading::{DeviceInfo, StructuredReading},
};

use chrono::Local;
use log::{debug, warn};
use serde_json::Value;
use std::sync::mpsc::channel;

/// Publishes every value on its own topic, `<base_topic>/<serial>/<key>`.
pub struct SimpleMqtt<MQTT: MqttWrapper> {
    client: MQTT,
    base_topic: String,
    parameters: ParameterSet,
}

impl<MQTT: MqttWrapper> SimpleMqtt<MQTT> {
    pub fn new(config: &MqttConfig) -> Self {
        // nothing is subscribed, so incoming messages are never read
        let (tx, _rx) = channel();
        let client = MQTT::new(config, "-sm", tx);
        Self::from_client(client, &config.base_topic)
    }

    pub fn from_client(client: MQTT, base_topic: &str) -> Self {
        Self {
            client,
            base_topic: base_topic.trim_end_matches('/').to_string(),
            parameters: ParameterSet::standard(),
        }
    }

    pub fn client(&self) -> &MQTT {
        &self.client
    }

    fn topic_payload_pairs(
        &self,
        device: &DeviceInfo,
        reading: &StructuredReading,
    ) -> Vec<(String, String)> {
        let prefix = format!("{}/{}", self.base_topic, device.serial);
        let mut pairs = vec![
            (format!("{prefix}/pcu_version"), device.pcu_version.to_string()),
            (
                format!("{prefix}/last_update"),
                Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            ),
        ];

        pairs.extend(
            state_values(reading, &self.parameters)
                .into_iter()
                .map(|(key, value)| {
                    let payload = match value {
                        Value::String(text) => text,
                        other => other.to_string(),
                    };
                    (format!("{prefix}/{key}"), payload)
                }),
        );
        pairs
    }
}

impl<MQTT: MqttWrapper> MetricCollector for SimpleMqtt<MQTT> {
    fn publish(&mut self, device: &DeviceInfo, reading: &StructuredReading) {
        if reading.is_empty() {
            return;
        }

        for (topic, payload) in self.topic_payload_pairs(device, reading) {
            debug!("Publishing to {topic} value: {payload}");
            if let Err(e) = self.client.publish(topic, QoS::AtMostOnce, true, payload) {
                warn!("mqtt error: {e:?}")
            }
        }
    }
}
