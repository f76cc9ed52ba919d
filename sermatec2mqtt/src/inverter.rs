use crate::parameters::ParameterValue;
use crate::reading::{DeviceInfo, StructuredReading};
use thiserror::Error;

/// TCP port the inverter's local API listens on.
pub const DEFAULT_PORT: u16 = 8899;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum NetworkState {
    Unknown,
    Online,
    Offline,
}

#[derive(Debug, Error)]
pub enum InverterError {
    #[error("couldn't connect to the inverter at {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("not connected to the inverter")]
    NotConnected,

    #[error("no data received from the inverter")]
    NoDataReceived,

    #[error("response failed the integrity check")]
    FailedResponseIntegrityCheck,

    #[error("connection reset by the inverter")]
    ConnectionReset,

    #[error("PCU version missing or malformed")]
    PcuVersionMalformed,

    #[error("parameter '{0}' not found")]
    ParameterNotFound(String),

    #[error("invalid value for parameter '{id}': {reason}")]
    InvalidValue { id: String, reason: String },

    #[error("parameter '{0}' can only be changed while the inverter is switched off")]
    InverterIsNotOff(String),

    #[error("inverter rejected the request: {0}")]
    Rejected(String),
}

/// One open conversation with the inverter.
///
/// Implementations belong to the protocol library; the bridge only relies on
/// these operations. Dropping the session closes the connection.
pub trait Session {
    /// Reads the serial number and the PCU version.
    fn system_information(&mut self) -> Result<DeviceInfo, InverterError>;

    /// Queries every status group the inverter supports.
    ///
    /// Groups that failed to answer are left out of the returned reading.
    fn get_status(&mut self) -> Result<StructuredReading, InverterError>;

    /// Writes a single control parameter.
    ///
    /// The inverter applies writes asynchronously, so the new value may show
    /// up only in a later status read.
    fn set_parameter(&mut self, id: &str, value: &ParameterValue) -> Result<(), InverterError>;
}

pub trait Connector {
    type Session: Session;

    fn connect(&self, host: &str, port: u16) -> Result<Self::Session, InverterError>;
}
