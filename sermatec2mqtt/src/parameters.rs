use crate::reading::StructuredReading;
use std::fmt;
use thiserror::Error;

/// Value written to (or read back from) a controllable parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParameterValue {
    Switch(bool),
    Option(String),
    Number(i64),
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Switch(true) => f.write_str("ON"),
            ParameterValue::Switch(false) => f.write_str("OFF"),
            ParameterValue::Option(option) => f.write_str(option),
            ParameterValue::Number(number) => write!(f, "{number}"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParameterError {
    #[error("duplicate friendly value '{0}' in converter map")]
    DuplicateMapValue(String),

    #[error("duplicate raw code {0:#06x} in converter map")]
    DuplicateMapCode(u16),

    #[error("unknown parameter '{0}'")]
    NotFound(String),

    #[error("parameter '{id}' expects a {expected} value")]
    WrongType { id: String, expected: &'static str },

    #[error("'{value}' is not an allowed option for '{id}'")]
    NotAllowed { id: String, value: String },

    #[error("{value} is outside of {min}..={max} for '{id}'")]
    OutOfRange {
        id: String,
        value: i64,
        min: i64,
        max: i64,
    },
}

/// Translates between raw register codes and the labels shown to users.
///
/// The map is bijective: every code has one label and every label one code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapConverter {
    map: Vec<(u16, String)>,
    default_raw: u16,
    default_friendly: String,
}

impl MapConverter {
    pub fn new(
        map: &[(u16, &str)],
        default_raw: u16,
        default_friendly: &str,
    ) -> Result<Self, ParameterError> {
        for (i, (raw, friendly)) in map.iter().enumerate() {
            if map[..i].iter().any(|(_, f)| f == friendly) {
                return Err(ParameterError::DuplicateMapValue(friendly.to_string()));
            }
            if map[..i].iter().any(|(r, _)| r == raw) {
                return Err(ParameterError::DuplicateMapCode(*raw));
            }
        }
        Ok(Self::from_bijective(map, default_raw, default_friendly))
    }

    /// Builds a converter from a map already known to be bijective.
    fn from_bijective(map: &[(u16, &str)], default_raw: u16, default_friendly: &str) -> Self {
        Self {
            map: map
                .iter()
                .map(|(raw, friendly)| (*raw, friendly.to_string()))
                .collect(),
            default_raw,
            default_friendly: default_friendly.to_string(),
        }
    }

    pub fn to_friendly(&self, raw: u16) -> &str {
        self.map
            .iter()
            .find(|(r, _)| *r == raw)
            .map(|(_, f)| f.as_str())
            .unwrap_or(&self.default_friendly)
    }

    pub fn from_friendly(&self, friendly: &str) -> u16 {
        self.map
            .iter()
            .find(|(_, f)| f == friendly)
            .map(|(r, _)| *r)
            .unwrap_or(self.default_raw)
    }

    pub fn list_friendly(&self) -> Vec<&str> {
        self.map.iter().map(|(_, f)| f.as_str()).collect()
    }
}

const OPERATING_MODES: [(u16, &str); 5] = [
    (0x0001, "General Mode"),
    (0x0002, "Energy Storage Mode"),
    (0x0003, "Micro-grid"),
    (0x0004, "Peak-Valley"),
    (0x0005, "AC Coupling"),
];

const _: () = assert!(
    is_bijective(&OPERATING_MODES),
    "operating mode map must be bijective"
);

/// Compile-time counterpart of the check in [`MapConverter::new`].
const fn is_bijective(map: &[(u16, &str)]) -> bool {
    let mut i = 0;
    while i < map.len() {
        let mut j = i + 1;
        while j < map.len() {
            if map[i].0 == map[j].0 || same_label(map[i].1, map[j].1) {
                return false;
            }
            j += 1;
        }
        i += 1;
    }
    true
}

const fn same_label(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

pub fn operating_mode_converter() -> MapConverter {
    // checked at compile time above
    MapConverter::from_bijective(&OPERATING_MODES, 0, "unknown")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Validator {
    Enum(Vec<String>),
    IntRange { min: i64, max: i64 },
}

impl Validator {
    pub fn validate(&self, value: &ParameterValue) -> bool {
        match (self, value) {
            (Validator::Enum(allowed), ParameterValue::Option(option)) => allowed.contains(option),
            (Validator::IntRange { min, max }, ParameterValue::Number(number)) => {
                (*min..=*max).contains(number)
            }
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlKind {
    Switch,
    Select(MapConverter),
    Number { min: i64, max: i64, step: i64 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParameterDefinition {
    pub id: &'static str,
    pub kind: ControlKind,
    /// The inverter only accepts the write while it is switched off.
    pub requires_off: bool,
}

impl ParameterDefinition {
    pub fn validator(&self) -> Option<Validator> {
        match &self.kind {
            ControlKind::Switch => None,
            ControlKind::Select(converter) => Some(Validator::Enum(
                converter
                    .list_friendly()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            )),
            ControlKind::Number { min, max, .. } => Some(Validator::IntRange {
                min: *min,
                max: *max,
            }),
        }
    }

    pub fn check(&self, value: &ParameterValue) -> Result<(), ParameterError> {
        match (&self.kind, value) {
            (ControlKind::Switch, ParameterValue::Switch(_)) => Ok(()),
            (ControlKind::Switch, _) => Err(self.wrong_type("switch")),
            (ControlKind::Select(_), ParameterValue::Option(option)) => {
                if self.validator().is_some_and(|v| v.validate(value)) {
                    Ok(())
                } else {
                    Err(ParameterError::NotAllowed {
                        id: self.id.to_string(),
                        value: option.clone(),
                    })
                }
            }
            (ControlKind::Select(_), _) => Err(self.wrong_type("option")),
            (ControlKind::Number { min, max, .. }, ParameterValue::Number(number)) => {
                if self.validator().is_some_and(|v| v.validate(value)) {
                    Ok(())
                } else {
                    Err(ParameterError::OutOfRange {
                        id: self.id.to_string(),
                        value: *number,
                        min: *min,
                        max: *max,
                    })
                }
            }
            (ControlKind::Number { .. }, _) => Err(self.wrong_type("number")),
        }
    }

    /// Extracts the parameter's present value from a reading, if reported.
    pub fn current_value(&self, reading: &StructuredReading) -> Option<ParameterValue> {
        match (self.id, &self.kind) {
            ("inverter_switched_on", _) => reading.switched_on.map(ParameterValue::Switch),
            ("operating_mode", ControlKind::Select(converter)) => {
                reading.working.as_ref().map(|working| {
                    ParameterValue::Option(converter.to_friendly(working.operating_mode).to_string())
                })
            }
            ("upper_limit_ongrid_power", _) => reading
                .working
                .as_ref()
                .map(|working| ParameterValue::Number(working.upper_limit_ongrid_power.into())),
            ("lower_limit_ongrid_soc", _) => reading
                .working
                .as_ref()
                .map(|working| ParameterValue::Number(working.lower_limit_ongrid_soc.into())),
            _ => None,
        }
    }

    fn wrong_type(&self, expected: &'static str) -> ParameterError {
        ParameterError::WrongType {
            id: self.id.to_string(),
            expected,
        }
    }
}

/// The controllable parameters known for residential hybrid inverters.
#[derive(Clone, Debug)]
pub struct ParameterSet {
    definitions: Vec<ParameterDefinition>,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self::standard()
    }
}

impl ParameterSet {
    pub fn standard() -> Self {
        Self {
            definitions: vec![
                ParameterDefinition {
                    id: "inverter_switched_on",
                    kind: ControlKind::Switch,
                    requires_off: false,
                },
                ParameterDefinition {
                    id: "operating_mode",
                    kind: ControlKind::Select(operating_mode_converter()),
                    requires_off: true,
                },
                ParameterDefinition {
                    id: "upper_limit_ongrid_power",
                    kind: ControlKind::Number {
                        min: 0,
                        max: 10_000,
                        step: 1,
                    },
                    requires_off: false,
                },
                ParameterDefinition {
                    id: "lower_limit_ongrid_soc",
                    kind: ControlKind::Number {
                        min: 10,
                        max: 100,
                        step: 1,
                    },
                    requires_off: false,
                },
            ],
        }
    }

    pub fn find(&self, id: &str) -> Result<&ParameterDefinition, ParameterError> {
        self.definitions
            .iter()
            .find(|definition| definition.id == id)
            .ok_or_else(|| ParameterError::NotFound(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterDefinition> {
        self.definitions.iter()
    }
}
