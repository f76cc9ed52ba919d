use crate::inverter::{Connector, InverterError, Session};
use crate::parameters::{operating_mode_converter, ParameterValue};
use crate::reading::{
    BatteryState, BatteryStatus, DeviceInfo, GridStatus, PhaseStatus, PvString, StatusFlags,
    StructuredReading, WorkingParameters,
};
use log::debug;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
struct SimulatorState {
    serial: String,
    pcu_version: u32,
    refused_connections: u32,
    connections: u32,
    status_reads: u64,
    switched_on: bool,
    working: WorkingParameters,
    // writes are applied on the next status read, like the real device
    pending: Vec<(String, ParameterValue)>,
    writes: Vec<(String, ParameterValue)>,
}

/// In-process stand-in for an inverter.
///
/// Clones share the same device, so a test can keep one handle to inspect
/// what the bridge did with the other.
#[derive(Clone, Debug)]
pub struct SimulatedInverter {
    state: Arc<Mutex<SimulatorState>>,
}

impl SimulatedInverter {
    pub fn new(serial: &str, pcu_version: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimulatorState {
                serial: serial.to_string(),
                pcu_version,
                refused_connections: 0,
                connections: 0,
                status_reads: 0,
                switched_on: true,
                working: WorkingParameters {
                    operating_mode: 0x0001,
                    upper_limit_ongrid_power: 6000,
                    lower_limit_ongrid_soc: 20,
                },
                pending: Vec::new(),
                writes: Vec::new(),
            })),
        }
    }

    /// Makes the next `count` connection attempts fail.
    pub fn refuse_connections(&self, count: u32) {
        self.lock().refused_connections = count;
    }

    pub fn connections(&self) -> u32 {
        self.lock().connections
    }

    /// Every write the inverter accepted, in order.
    pub fn writes(&self) -> Vec<(String, ParameterValue)> {
        self.lock().writes.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SimulatorState> {
        // a panicking test thread must not take the other handles down with it
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SimulatedInverter {
    fn default() -> Self {
        Self::new("SIM0000000001", 400)
    }
}

impl Connector for SimulatedInverter {
    type Session = SimulatedSession;

    fn connect(&self, host: &str, port: u16) -> Result<Self::Session, InverterError> {
        let mut state = self.lock();
        if state.refused_connections > 0 {
            state.refused_connections -= 1;
            return Err(InverterError::Connect {
                host: host.to_string(),
                port,
                reason: "connection refused".to_string(),
            });
        }
        state.connections += 1;
        debug!("simulated inverter accepted connection #{}", state.connections);
        Ok(SimulatedSession {
            inverter: self.clone(),
        })
    }
}

pub struct SimulatedSession {
    inverter: SimulatedInverter,
}

impl Session for SimulatedSession {
    fn system_information(&mut self) -> Result<DeviceInfo, InverterError> {
        let state = self.inverter.lock();
        Ok(DeviceInfo {
            serial: state.serial.clone(),
            pcu_version: state.pcu_version,
        })
    }

    fn get_status(&mut self) -> Result<StructuredReading, InverterError> {
        let mut state = self.inverter.lock();
        for (id, value) in std::mem::take(&mut state.pending) {
            apply(&mut state, &id, &value);
        }
        state.status_reads += 1;

        // a slow, repeating wave keeps the values moving between reads
        let phase = (state.status_reads % 12) as f32;
        let pv1_power = 1500.0 + 100.0 * phase;
        let pv2_power = 900.0 + 50.0 * phase;
        let charging = state.status_reads % 2 == 0;
        let battery_current = if charging { 12.5 } else { -8.0 };

        let active_power = if state.switched_on {
            (pv1_power + pv2_power) as i32 - 2200
        } else {
            -450
        };

        Ok(StructuredReading {
            pv: vec![
                PvString {
                    index: 1,
                    voltage: 350.0,
                    current: pv1_power / 350.0,
                    power: pv1_power,
                },
                PvString {
                    index: 2,
                    voltage: 320.0,
                    current: pv2_power / 320.0,
                    power: pv2_power,
                },
            ],
            battery: Some(BatteryStatus {
                voltage: 51.2,
                current: battery_current,
                temperature: 24.0,
                soc: 62,
                soh: 98,
                state: if charging {
                    BatteryState::Charging
                } else {
                    BatteryState::Discharging
                },
                max_charging_current: 50.0,
                max_discharging_current: 50.0,
            }),
            grid: Some(GridStatus {
                active_power,
                reactive_power: 35,
                apparent_power: active_power.abs() + 40,
                frequency: 50.01,
                phase_a: PhaseStatus {
                    voltage: 231.2,
                    current: 1.8,
                },
                phase_b: PhaseStatus {
                    voltage: 230.4,
                    current: 1.7,
                },
                phase_c: PhaseStatus {
                    voltage: 229.9,
                    current: 1.9,
                },
                ab_line_voltage: 400.1,
                bc_line_voltage: 399.2,
                ca_line_voltage: 400.6,
            }),
            working: Some(state.working.clone()),
            switched_on: Some(state.switched_on),
            flags: Some(StatusFlags {
                battery_communication_ok: true,
                grid_connected: true,
                fault: false,
            }),
        })
    }

    fn set_parameter(&mut self, id: &str, value: &ParameterValue) -> Result<(), InverterError> {
        let mut state = self.inverter.lock();
        match (id, value) {
            ("inverter_switched_on", ParameterValue::Switch(_))
            | ("operating_mode", ParameterValue::Option(_))
            | ("upper_limit_ongrid_power", ParameterValue::Number(_))
            | ("lower_limit_ongrid_soc", ParameterValue::Number(_)) => {}
            ("inverter_switched_on", _)
            | ("operating_mode", _)
            | ("upper_limit_ongrid_power", _)
            | ("lower_limit_ongrid_soc", _) => {
                return Err(InverterError::InvalidValue {
                    id: id.to_string(),
                    reason: format!("unexpected value {value}"),
                })
            }
            _ => return Err(InverterError::ParameterNotFound(id.to_string())),
        }
        state.pending.push((id.to_string(), value.clone()));
        state.writes.push((id.to_string(), value.clone()));
        Ok(())
    }
}

fn apply(state: &mut SimulatorState, id: &str, value: &ParameterValue) {
    match (id, value) {
        ("inverter_switched_on", ParameterValue::Switch(on)) => state.switched_on = *on,
        ("operating_mode", ParameterValue::Option(option)) => {
            state.working.operating_mode = operating_mode_converter().from_friendly(option)
        }
        ("upper_limit_ongrid_power", ParameterValue::Number(number)) => {
            state.working.upper_limit_ongrid_power = (*number).clamp(0, u16::MAX.into()) as u16
        }
        ("lower_limit_ongrid_soc", ParameterValue::Number(number)) => {
            state.working.lower_limit_ongrid_soc = (*number).clamp(0, 100) as u8
        }
        _ => {}
    }
}
