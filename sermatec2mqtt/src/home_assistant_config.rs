use crate::entities::{EntityDescriptor, EntityKind};
use crate::reading::DeviceInfo;
use serde::Serialize;

/// `DeviceConfig` groups the entities of one inverter in Home Assistant.
#[derive(Serialize, Clone, Debug)]
pub struct DeviceConfig {
    name: String,
    model: String,
    pub identifiers: Vec<String>,
    manufacturer: String,
    sw_version: String, // PCU firmware of the inverter
}

impl DeviceConfig {
    pub fn new(device: &DeviceInfo) -> Self {
        Self {
            name: format!("Sermatec {}", device.serial),
            model: "Residential Hybrid Inverter 5-10 kW".to_string(),
            identifiers: vec![format!("sermatec_{}", device.serial)],
            manufacturer: "Sermatec".to_string(),
            sw_version: device.pcu_version.to_string(),
        }
    }
}

/// `EntityConfig` is the MQTT discovery payload of one entity.
///
/// More information about the MQTT discovery protocol can be found here:
/// https://www.home-assistant.io/integrations/mqtt/#mqtt-discovery
#[derive(Serialize, Debug)]
pub struct EntityConfig {
    pub unique_id: String,
    name: String,
    state_topic: String,
    value_template: String,
    device: DeviceConfig,
    availability_topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    command_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit_of_measurement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload_on: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload_off: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    min: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<i64>,
}

impl EntityConfig {
    pub fn new(
        entity: &EntityDescriptor,
        device: &DeviceInfo,
        device_config: &DeviceConfig,
        topics: &Topics,
    ) -> Self {
        let (payload_on, payload_off) = match entity.kind {
            EntityKind::Switch | EntityKind::BinarySensor => {
                (Some("ON".to_string()), Some("OFF".to_string()))
            }
            _ => (None, None),
        };
        let control = entity.kind.is_control();

        Self {
            unique_id: format!("{}_{}", device.serial, entity.key),
            name: entity.name.clone(),
            state_topic: topics.state.clone(),
            value_template: format!("{{{{ value_json.{} }}}}", entity.key),
            device: device_config.clone(),
            availability_topic: topics.availability.clone(),
            command_topic: control.then(|| topics.command(&entity.key)),
            unit_of_measurement: entity.unit.map(str::to_string),
            device_class: entity.device_class.map(str::to_string),
            state_class: entity.state_class.map(str::to_string),
            payload_on,
            payload_off,
            options: entity.options.clone(),
            min: entity.range.map(|(min, _, _)| min),
            max: entity.range.map(|(_, max, _)| max),
            step: entity.range.map(|(_, _, step)| step),
        }
    }
}

/// MQTT topics used for one inverter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topics {
    pub discovery_prefix: String,
    pub state: String,
    pub availability: String,
    command_prefix: String,
}

impl Topics {
    pub fn new(serial: &str) -> Self {
        Self {
            discovery_prefix: format!("sermatec_{serial}"),
            state: format!("sermatec/{serial}/state"),
            availability: format!("sermatec/{serial}/availability"),
            command_prefix: format!("sermatec/{serial}/"),
        }
    }

    pub fn config(&self, entity: &EntityDescriptor) -> String {
        format!(
            "homeassistant/{}/{}/{}/config",
            entity.kind.component(),
            self.discovery_prefix,
            entity.key
        )
    }

    pub fn command(&self, key: &str) -> String {
        format!("{}{key}/set", self.command_prefix)
    }

    /// Key of the entity a command topic belongs to.
    pub fn command_key<'a>(&self, topic: &'a str) -> Option<&'a str> {
        topic
            .strip_prefix(&self.command_prefix)?
            .strip_suffix("/set")
            .filter(|key| !key.is_empty() && !key.contains('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::EntityCatalogue;
    use crate::i18n::Language;
    use crate::parameters::ParameterSet;

    fn device() -> DeviceInfo {
        DeviceInfo {
            serial: "ABC123".to_string(),
            pcu_version: 401,
        }
    }

    #[test]
    fn topics_follow_the_serial() {
        let topics = Topics::new("ABC123");
        assert_eq!(topics.state, "sermatec/ABC123/state");
        assert_eq!(topics.availability, "sermatec/ABC123/availability");
        assert_eq!(
            topics.command("operating_mode"),
            "sermatec/ABC123/operating_mode/set"
        );
        assert_eq!(
            topics.command_key("sermatec/ABC123/operating_mode/set"),
            Some("operating_mode")
        );
        assert_eq!(topics.command_key("sermatec/ABC123/state"), None);
        assert_eq!(topics.command_key("sermatec/OTHER/operating_mode/set"), None);
    }

    #[test]
    fn controls_carry_command_and_availability_topics() {
        let catalogue = EntityCatalogue::new(Language::English, &ParameterSet::standard());
        let topics = Topics::new("ABC123");
        let device = device();
        let device_config = DeviceConfig::new(&device);

        let switch = catalogue.get("inverter_switched_on").unwrap();
        assert_eq!(
            topics.config(switch),
            "homeassistant/switch/sermatec_ABC123/inverter_switched_on/config"
        );
        let json =
            serde_json::to_value(EntityConfig::new(switch, &device, &device_config, &topics))
                .unwrap();
        assert_eq!(json["unique_id"], "ABC123_inverter_switched_on");
        assert_eq!(json["command_topic"], "sermatec/ABC123/inverter_switched_on/set");
        assert_eq!(json["availability_topic"], "sermatec/ABC123/availability");
        assert_eq!(json["payload_on"], "ON");
        assert_eq!(json["device"]["manufacturer"], "Sermatec");
        assert_eq!(json["device"]["sw_version"], "401");

        let soc = catalogue.get("lower_limit_ongrid_soc").unwrap();
        let json =
            serde_json::to_value(EntityConfig::new(soc, &device, &device_config, &topics)).unwrap();
        assert_eq!(json["min"], 10);
        assert_eq!(json["max"], 100);
        assert_eq!(json["unit_of_measurement"], "%");
    }

    #[test]
    fn sensors_share_availability_but_have_no_command_topic() {
        let catalogue = EntityCatalogue::new(Language::English, &ParameterSet::standard());
        let topics = Topics::new("ABC123");
        let device = device();
        let sensor = catalogue.get("battery_soc").unwrap();

        let json = serde_json::to_value(EntityConfig::new(
            sensor,
            &device,
            &DeviceConfig::new(&device),
            &topics,
        ))
        .unwrap();
        assert!(json.get("command_topic").is_none());
        assert_eq!(json["availability_topic"], "sermatec/ABC123/availability");
        assert!(json.get("options").is_none());
        assert_eq!(json["value_template"], "{{ value_json.battery_soc }}");
        assert_eq!(json["state_class"], "measurement");
    }
}
