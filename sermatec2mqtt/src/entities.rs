use crate::i18n::{Language, PvQuantity};
use crate::parameters::{ControlKind, ParameterSet, ParameterValue};
use crate::reading::StructuredReading;
use serde_json::{Map, Value};

/// Residential 5-10 kW models have two MPPT inputs.
pub const PV_STRINGS: u8 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    Sensor,
    BinarySensor,
    Switch,
    Select,
    Number,
}

impl EntityKind {
    /// Home Assistant component the entity is announced under.
    pub fn component(&self) -> &'static str {
        match self {
            EntityKind::Sensor => "sensor",
            EntityKind::BinarySensor => "binary_sensor",
            EntityKind::Switch => "switch",
            EntityKind::Select => "select",
            EntityKind::Number => "number",
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(
            self,
            EntityKind::Switch | EntityKind::Select | EntityKind::Number
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EntityDescriptor {
    pub key: String,
    pub kind: EntityKind,
    pub name: String,
    pub device_class: Option<&'static str>,
    pub unit: Option<&'static str>,
    pub state_class: Option<&'static str>,
    pub options: Vec<String>,
    /// `(min, max, step)` of number entities.
    pub range: Option<(i64, i64, i64)>,
}

impl EntityDescriptor {
    fn new(language: Language, key: &str, kind: EntityKind) -> Self {
        Self {
            key: key.to_string(),
            kind,
            name: language.entity_name(key).unwrap_or(key).to_string(),
            device_class: None,
            unit: None,
            state_class: None,
            options: Vec::new(),
            range: None,
        }
    }

    fn measurement(mut self, device_class: &'static str, unit: &'static str) -> Self {
        self.device_class = Some(device_class);
        self.unit = Some(unit);
        self.state_class = Some("measurement");
        self
    }
}

fn sensor(language: Language, key: &str, device_class: &'static str, unit: &'static str) -> EntityDescriptor {
    EntityDescriptor::new(language, key, EntityKind::Sensor).measurement(device_class, unit)
}

/// All entities the bridge exposes for one inverter.
#[derive(Clone, Debug)]
pub struct EntityCatalogue {
    entities: Vec<EntityDescriptor>,
}

impl EntityCatalogue {
    pub fn new(language: Language, parameters: &ParameterSet) -> Self {
        let mut entities = Vec::new();

        for index in 1..=PV_STRINGS {
            for (quantity, device_class, unit) in [
                (PvQuantity::Voltage, "voltage", "V"),
                (PvQuantity::Current, "current", "A"),
                (PvQuantity::Power, "power", "W"),
            ] {
                let key = format!("pv{index}_{}", quantity.key_suffix());
                let mut entity = sensor(language, &key, device_class, unit);
                entity.name = language.pv_string_name(index, quantity);
                entities.push(entity);
            }
        }
        entities.push(sensor(language, "pv_total_power", "power", "W"));

        entities.extend([
            sensor(language, "battery_voltage", "voltage", "V"),
            sensor(language, "battery_current", "current", "A"),
            sensor(language, "battery_temperature", "temperature", "°C"),
            sensor(language, "battery_soc", "battery", "%"),
            sensor(language, "battery_soh", "battery", "%"),
            EntityDescriptor::new(language, "battery_state", EntityKind::Sensor),
            sensor(language, "battery_max_charging_current", "current", "A"),
            sensor(language, "battery_max_discharging_current", "current", "A"),
            sensor(language, "battery_charging_power", "power", "W"),
            sensor(language, "battery_discharging_power", "power", "W"),
        ]);

        entities.extend([
            sensor(language, "grid_active_power", "power", "W"),
            sensor(language, "grid_reactive_power", "reactive_power", "var"),
            sensor(language, "grid_apparent_power", "apparent_power", "VA"),
            sensor(language, "grid_frequency", "frequency", "Hz"),
            sensor(language, "grid_import_power", "power", "W"),
            sensor(language, "grid_export_power", "power", "W"),
        ]);
        for phase in ["a", "b", "c"] {
            entities.push(sensor(language, &format!("{phase}_phase_voltage"), "voltage", "V"));
            entities.push(sensor(language, &format!("{phase}_phase_current"), "current", "A"));
        }
        for line in ["ab", "bc", "ca"] {
            entities.push(sensor(language, &format!("{line}_line_voltage"), "voltage", "V"));
        }

        for (key, device_class) in [
            ("battery_communication", "connectivity"),
            ("grid_connection", "connectivity"),
            ("fault", "problem"),
        ] {
            let mut entity = EntityDescriptor::new(language, key, EntityKind::BinarySensor);
            entity.device_class = Some(device_class);
            entities.push(entity);
        }

        for definition in parameters.iter() {
            let entity = match &definition.kind {
                ControlKind::Switch => {
                    let mut entity =
                        EntityDescriptor::new(language, definition.id, EntityKind::Switch);
                    entity.device_class = Some("switch");
                    entity
                }
                ControlKind::Select(converter) => {
                    let mut entity =
                        EntityDescriptor::new(language, definition.id, EntityKind::Select);
                    entity.options = converter
                        .list_friendly()
                        .into_iter()
                        .map(str::to_string)
                        .collect();
                    entity
                }
                ControlKind::Number { min, max, step } => {
                    let mut entity =
                        EntityDescriptor::new(language, definition.id, EntityKind::Number);
                    entity.range = Some((*min, *max, *step));
                    match definition.id {
                        "upper_limit_ongrid_power" => {
                            entity.device_class = Some("power");
                            entity.unit = Some("W");
                        }
                        "lower_limit_ongrid_soc" => {
                            entity.device_class = Some("battery");
                            entity.unit = Some("%");
                        }
                        _ => {}
                    }
                    entity
                }
            };
            entities.push(entity);
        }

        Self { entities }
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.entities.iter()
    }

    pub fn get(&self, key: &str) -> Option<&EntityDescriptor> {
        self.entities.iter().find(|entity| entity.key == key)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn round2(value: f32) -> Value {
    ((value as f64 * 100.0).round() / 100.0).into()
}

fn on_off(value: bool) -> Value {
    Value::from(if value { "ON" } else { "OFF" })
}

/// Flattens a reading into the state document entities read their values from.
///
/// Groups missing from the reading simply leave their keys out, which Home
/// Assistant shows as unknown.
pub fn state_values(reading: &StructuredReading, parameters: &ParameterSet) -> Map<String, Value> {
    let mut json = Map::new();

    for pv in &reading.pv {
        json.insert(format!("pv{}_voltage", pv.index), round2(pv.voltage));
        json.insert(format!("pv{}_current", pv.index), round2(pv.current));
        json.insert(format!("pv{}_power", pv.index), round2(pv.power));
    }
    if !reading.pv.is_empty() {
        json.insert("pv_total_power".into(), round2(reading.pv_total_power()));
    }

    if let Some(battery) = &reading.battery {
        json.insert("battery_voltage".into(), round2(battery.voltage));
        json.insert("battery_current".into(), round2(battery.current));
        json.insert("battery_temperature".into(), round2(battery.temperature));
        json.insert("battery_soc".into(), battery.soc.into());
        json.insert("battery_soh".into(), battery.soh.into());
        json.insert("battery_state".into(), battery.state.as_str().into());
        json.insert(
            "battery_max_charging_current".into(),
            round2(battery.max_charging_current),
        );
        json.insert(
            "battery_max_discharging_current".into(),
            round2(battery.max_discharging_current),
        );
        json.insert(
            "battery_charging_power".into(),
            round2(battery.charging_power()),
        );
        json.insert(
            "battery_discharging_power".into(),
            round2(battery.discharging_power()),
        );
    }

    if let Some(grid) = &reading.grid {
        json.insert("grid_active_power".into(), grid.active_power.into());
        json.insert("grid_reactive_power".into(), grid.reactive_power.into());
        json.insert("grid_apparent_power".into(), grid.apparent_power.into());
        json.insert("grid_frequency".into(), round2(grid.frequency));
        json.insert("grid_import_power".into(), grid.import_power().into());
        json.insert("grid_export_power".into(), grid.export_power().into());
        for (phase, status) in [
            ("a", &grid.phase_a),
            ("b", &grid.phase_b),
            ("c", &grid.phase_c),
        ] {
            json.insert(format!("{phase}_phase_voltage"), round2(status.voltage));
            json.insert(format!("{phase}_phase_current"), round2(status.current));
        }
        json.insert("ab_line_voltage".into(), round2(grid.ab_line_voltage));
        json.insert("bc_line_voltage".into(), round2(grid.bc_line_voltage));
        json.insert("ca_line_voltage".into(), round2(grid.ca_line_voltage));
    }

    if let Some(flags) = &reading.flags {
        json.insert(
            "battery_communication".into(),
            on_off(flags.battery_communication_ok),
        );
        json.insert("grid_connection".into(), on_off(flags.grid_connected));
        json.insert("fault".into(), on_off(flags.fault));
    }

    for definition in parameters.iter() {
        let value = match definition.current_value(reading) {
            Some(ParameterValue::Switch(on)) => on_off(on),
            Some(ParameterValue::Option(option)) => option.into(),
            Some(ParameterValue::Number(number)) => number.into(),
            None => continue,
        };
        json.insert(definition.id.to_string(), value);
    }

    json
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::{BatteryState, BatteryStatus, GridStatus, PvString};

    #[test]
    fn catalogue_covers_telemetry_and_controls() {
        let catalogue = EntityCatalogue::new(Language::English, &ParameterSet::standard());

        for key in [
            "pv1_power",
            "pv2_power",
            "pv_total_power",
            "battery_charging_power",
            "battery_discharging_power",
            "grid_import_power",
            "grid_export_power",
        ] {
            let entity = catalogue.get(key).unwrap();
            assert_eq!(entity.kind, EntityKind::Sensor);
            assert_eq!(entity.unit, Some("W"));
        }

        let power = catalogue.get("inverter_switched_on").unwrap();
        assert_eq!(power.kind, EntityKind::Switch);
        assert_eq!(power.name, "Power");

        let mode = catalogue.get("operating_mode").unwrap();
        assert_eq!(mode.kind, EntityKind::Select);
        assert_eq!(mode.options.len(), 5);

        let soc = catalogue.get("lower_limit_ongrid_soc").unwrap();
        assert_eq!(soc.range, Some((10, 100, 1)));

        let controls = catalogue.iter().filter(|e| e.kind.is_control()).count();
        assert_eq!(controls, 4);
    }

    #[test]
    fn every_entity_has_a_translated_name() {
        for language in [Language::English, Language::Czech] {
            let catalogue = EntityCatalogue::new(language, &ParameterSet::standard());
            for entity in catalogue.iter() {
                assert_ne!(entity.name, entity.key, "{} untranslated", entity.key);
            }
        }
    }

    #[test]
    fn state_document_contains_derived_values() {
        let reading = StructuredReading {
            pv: vec![
                PvString {
                    index: 1,
                    voltage: 350.0,
                    current: 4.0,
                    power: 1400.0,
                },
                PvString {
                    index: 2,
                    voltage: 300.0,
                    current: 2.0,
                    power: 600.0,
                },
            ],
            battery: Some(BatteryStatus {
                voltage: 50.0,
                current: -10.0,
                temperature: 25.0,
                soc: 70,
                soh: 100,
                state: BatteryState::Discharging,
                max_charging_current: 50.0,
                max_discharging_current: 50.0,
            }),
            grid: Some(GridStatus {
                active_power: -800,
                ..Default::default()
            }),
            switched_on: Some(false),
            ..Default::default()
        };

        let json = state_values(&reading, &ParameterSet::standard());
        assert_eq!(json["pv_total_power"], 2000.0);
        assert_eq!(json["battery_discharging_power"], 500.0);
        assert_eq!(json["battery_charging_power"], 0.0);
        assert_eq!(json["battery_state"], "discharging");
        assert_eq!(json["grid_import_power"], 800);
        assert_eq!(json["grid_export_power"], 0);
        assert_eq!(json["inverter_switched_on"], "OFF");
        assert!(!json.contains_key("operating_mode"));
        assert!(!json.contains_key("fault"));
    }
}
