use serde::Serialize;
use std::fmt;

/// Identity of the connected inverter, read once during setup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub serial: String,
    /// Version of the power conditioning unit firmware. Zero means the
    /// inverter did not report one.
    pub pcu_version: u32,
}

impl DeviceInfo {
    pub fn has_version(&self) -> bool {
        self.pcu_version != 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatteryState {
    Charging,
    Discharging,
    StandBy,
    Unknown,
}

impl BatteryState {
    /// Decodes the state word reported by the battery status query.
    pub fn from_code(code: u16) -> Self {
        match code {
            0x0011 => BatteryState::Charging,
            0x0022 => BatteryState::Discharging,
            0x0033 => BatteryState::StandBy,
            _ => BatteryState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatteryState::Charging => "charging",
            BatteryState::Discharging => "discharging",
            BatteryState::StandBy => "stand-by",
            BatteryState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for BatteryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PvString {
    /// 1-based string number as printed on the inverter.
    pub index: u8,
    pub voltage: f32,
    pub current: f32,
    pub power: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatteryStatus {
    pub voltage: f32,
    /// Positive while charging, negative while discharging.
    pub current: f32,
    pub temperature: f32,
    pub soc: u8,
    pub soh: u8,
    pub state: BatteryState,
    pub max_charging_current: f32,
    pub max_discharging_current: f32,
}

impl BatteryStatus {
    pub fn charging_power(&self) -> f32 {
        match self.state {
            BatteryState::Charging => (self.voltage * self.current).abs(),
            _ => 0.0,
        }
    }

    pub fn discharging_power(&self) -> f32 {
        match self.state {
            BatteryState::Discharging => (self.voltage * self.current).abs(),
            _ => 0.0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PhaseStatus {
    pub voltage: f32,
    pub current: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct GridStatus {
    /// Positive when exporting to the grid, negative when importing.
    pub active_power: i32,
    pub reactive_power: i32,
    pub apparent_power: i32,
    pub frequency: f32,
    pub phase_a: PhaseStatus,
    pub phase_b: PhaseStatus,
    pub phase_c: PhaseStatus,
    pub ab_line_voltage: f32,
    pub bc_line_voltage: f32,
    pub ca_line_voltage: f32,
}

impl GridStatus {
    pub fn export_power(&self) -> i32 {
        self.active_power.max(0)
    }

    pub fn import_power(&self) -> i32 {
        self.active_power.min(0).saturating_abs()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WorkingParameters {
    pub operating_mode: u16,
    pub upper_limit_ongrid_power: u16,
    pub lower_limit_ongrid_soc: u8,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatusFlags {
    pub battery_communication_ok: bool,
    pub grid_connected: bool,
    pub fault: bool,
}

/// Telemetry returned by one status read.
///
/// Every group is optional: the inverter answers each query separately and a
/// failed query only drops its own group.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StructuredReading {
    pub pv: Vec<PvString>,
    pub battery: Option<BatteryStatus>,
    pub grid: Option<GridStatus>,
    pub working: Option<WorkingParameters>,
    pub switched_on: Option<bool>,
    pub flags: Option<StatusFlags>,
}

impl StructuredReading {
    pub fn is_empty(&self) -> bool {
        self.pv.is_empty()
            && self.battery.is_none()
            && self.grid.is_none()
            && self.working.is_none()
            && self.switched_on.is_none()
            && self.flags.is_none()
    }

    pub fn pv_total_power(&self) -> f32 {
        self.pv.iter().map(|pv| pv.power).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn battery(state: BatteryState, current: f32) -> BatteryStatus {
        BatteryStatus {
            voltage: 50.0,
            current,
            temperature: 21.5,
            soc: 80,
            soh: 99,
            state,
            max_charging_current: 50.0,
            max_discharging_current: 50.0,
        }
    }

    #[test]
    fn battery_state_codes() {
        assert_eq!(BatteryState::from_code(0x11), BatteryState::Charging);
        assert_eq!(BatteryState::from_code(0x22), BatteryState::Discharging);
        assert_eq!(BatteryState::from_code(0x33), BatteryState::StandBy);
        assert_eq!(BatteryState::from_code(0x44), BatteryState::Unknown);
        assert_eq!(BatteryState::StandBy.to_string(), "stand-by");
    }

    #[test]
    fn battery_power_follows_state() {
        let charging = battery(BatteryState::Charging, 10.0);
        assert_eq!(charging.charging_power(), 500.0);
        assert_eq!(charging.discharging_power(), 0.0);

        let discharging = battery(BatteryState::Discharging, -4.0);
        assert_eq!(discharging.charging_power(), 0.0);
        assert_eq!(discharging.discharging_power(), 200.0);

        let idle = battery(BatteryState::StandBy, 0.5);
        assert_eq!(idle.charging_power(), 0.0);
        assert_eq!(idle.discharging_power(), 0.0);
    }

    #[test]
    fn grid_power_splits_by_sign() {
        let exporting = GridStatus {
            active_power: 1200,
            ..Default::default()
        };
        assert_eq!(exporting.export_power(), 1200);
        assert_eq!(exporting.import_power(), 0);

        let importing = GridStatus {
            active_power: -340,
            ..Default::default()
        };
        assert_eq!(importing.export_power(), 0);
        assert_eq!(importing.import_power(), 340);
    }

    #[test]
    fn empty_reading() {
        let mut reading = StructuredReading::default();
        assert!(reading.is_empty());
        assert_eq!(reading.pv_total_power(), 0.0);

        reading.pv.push(PvString {
            index: 1,
            voltage: 300.0,
            current: 2.0,
            power: 600.0,
        });
        reading.pv.push(PvString {
            index: 2,
            voltage: 280.0,
            current: 1.0,
            power: 280.0,
        });
        assert!(!reading.is_empty());
        assert_eq!(reading.pv_total_power(), 880.0);
    }
}
