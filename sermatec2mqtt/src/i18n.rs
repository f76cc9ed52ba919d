//! Entity names in the languages offered during setup.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("translation for language '{0}' does not exist (supported: en, cs)")]
pub struct UnsupportedLanguage(pub String);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Language {
    #[default]
    English,
    Czech,
}

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Language::English),
            "cs" => Ok(Language::Czech),
            _ => Err(UnsupportedLanguage(s.to_string())),
        }
    }
}

impl TryFrom<String> for Language {
    type Error = UnsupportedLanguage;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PvQuantity {
    Voltage,
    Current,
    Power,
}

impl PvQuantity {
    pub fn key_suffix(&self) -> &'static str {
        match self {
            PvQuantity::Voltage => "voltage",
            PvQuantity::Current => "current",
            PvQuantity::Power => "power",
        }
    }
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Czech => "cs",
        }
    }

    pub fn pv_string_name(&self, index: u8, quantity: PvQuantity) -> String {
        let quantity = match (self, quantity) {
            (Language::English, PvQuantity::Voltage) => "Voltage",
            (Language::English, PvQuantity::Current) => "Current",
            (Language::English, PvQuantity::Power) => "Power",
            (Language::Czech, PvQuantity::Voltage) => "napětí",
            (Language::Czech, PvQuantity::Current) => "proud",
            (Language::Czech, PvQuantity::Power) => "výkon",
        };
        format!("PV{index} {quantity}")
    }

    /// Name shown for an entity, or `None` for keys without a translation.
    pub fn entity_name(&self, key: &str) -> Option<&'static str> {
        let (en, cs) = match key {
            "pv_total_power" => ("PV Total Power", "Celkový výkon FV"),
            "battery_voltage" => ("Battery Voltage", "Napětí baterie"),
            "battery_current" => ("Battery Current", "Proud baterie"),
            "battery_temperature" => ("Battery Temperature", "Teplota baterie"),
            "battery_soc" => ("Battery SOC", "Nabití baterie"),
            "battery_soh" => ("Battery SOH", "Zdraví baterie"),
            "battery_state" => ("Battery State", "Stav baterie"),
            "battery_max_charging_current" => {
                ("Battery Max Charging Current", "Max. nabíjecí proud baterie")
            }
            "battery_max_discharging_current" => {
                ("Battery Max Discharging Current", "Max. vybíjecí proud baterie")
            }
            "battery_charging_power" => ("Battery Charging Power", "Nabíjecí výkon baterie"),
            "battery_discharging_power" => ("Battery Discharging Power", "Vybíjecí výkon baterie"),
            "grid_active_power" => ("Grid Active Power", "Činný výkon sítě"),
            "grid_reactive_power" => ("Grid Reactive Power", "Jalový výkon sítě"),
            "grid_apparent_power" => ("Grid Apparent Power", "Zdánlivý výkon sítě"),
            "grid_frequency" => ("Grid Frequency", "Frekvence sítě"),
            "grid_import_power" => ("Grid Import Power", "Odběr ze sítě"),
            "grid_export_power" => ("Grid Export Power", "Dodávka do sítě"),
            "a_phase_voltage" => ("Phase A Voltage", "Napětí fáze A"),
            "b_phase_voltage" => ("Phase B Voltage", "Napětí fáze B"),
            "c_phase_voltage" => ("Phase C Voltage", "Napětí fáze C"),
            "a_phase_current" => ("Phase A Current", "Proud fáze A"),
            "b_phase_current" => ("Phase B Current", "Proud fáze B"),
            "c_phase_current" => ("Phase C Current", "Proud fáze C"),
            "ab_line_voltage" => ("AB Line Voltage", "Sdružené napětí AB"),
            "bc_line_voltage" => ("BC Line Voltage", "Sdružené napětí BC"),
            "ca_line_voltage" => ("CA Line Voltage", "Sdružené napětí CA"),
            "battery_communication" => ("Battery Communication", "Komunikace s baterií"),
            "grid_connection" => ("Grid Connection", "Připojení k síti"),
            "fault" => ("Fault", "Porucha"),
            "inverter_switched_on" => ("Power", "Zapnuto"),
            "operating_mode" => ("Operating Mode", "Provozní režim"),
            "upper_limit_ongrid_power" => ("On-grid Power Limit", "Limit výkonu do sítě"),
            "lower_limit_ongrid_soc" => ("On-grid SOC Lower Limit", "Spodní limit nabití při síti"),
            _ => return None,
        };
        Some(match self {
            Language::English => en,
            Language::Czech => cs,
        })
    }
}
