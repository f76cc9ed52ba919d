use crate::i18n::{Language, UnsupportedLanguage};
use crate::inverter::DEFAULT_PORT;
use serde::de::IgnoredAny;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error(
        "'{0}' belongs to the old YAML sensor platform and is no longer supported; \
         remove the device and add it again using 'host', 'port' and 'language'"
    )]
    LegacyKey(&'static str),

    #[error("inverter host is empty")]
    MissingHost,

    #[error("invalid inverter port '{0}'")]
    InvalidPort(String),

    #[error(transparent)]
    Language(#[from] UnsupportedLanguage),
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(u16),
    Text(String),
}

/// Raw setup fields, exactly as entered by the user.
///
/// The setup form historically took the port as text, so both numbers and
/// numeric strings are accepted.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InverterSettings {
    #[serde(default)]
    pub host: String,
    pub port: Option<PortValue>,
    pub language: Option<String>,
    // keys of the YAML sensor platform, kept only to reject them explicitly
    #[serde(default)]
    platform: Option<IgnoredAny>,
    #[serde(default)]
    ip_address: Option<IgnoredAny>,
}

impl InverterSettings {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            ..Default::default()
        }
    }
}

/// Validated connection settings of one inverter.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "InverterSettings")]
pub struct InverterConfig {
    pub host: String,
    pub port: u16,
    pub language: Language,
}

impl TryFrom<InverterSettings> for InverterConfig {
    type Error = ConfigError;

    fn try_from(settings: InverterSettings) -> Result<Self, Self::Error> {
        if settings.ip_address.is_some() {
            return Err(ConfigError::LegacyKey("ip_address"));
        }
        if settings.platform.is_some() {
            return Err(ConfigError::LegacyKey("platform"));
        }

        let host = settings.host.trim();
        if host.is_empty() {
            return Err(ConfigError::MissingHost);
        }

        let port = match settings.port {
            None => DEFAULT_PORT,
            Some(PortValue::Number(0)) => return Err(ConfigError::InvalidPort("0".to_string())),
            Some(PortValue::Number(port)) => port,
            Some(PortValue::Text(text)) => match text.trim().parse::<u16>() {
                Ok(port) if port != 0 => port,
                _ => return Err(ConfigError::InvalidPort(text)),
            },
        };

        let language = match settings.language {
            Some(language) => language.parse()?,
            None => Language::default(),
        };

        Ok(Self {
            host: host.to_string(),
            port,
            language,
        })
    }
}
