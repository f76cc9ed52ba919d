use crate::integration_config::InverterConfig;
use crate::inverter::{Connector, InverterError, NetworkState, Session};
use crate::parameters::{ParameterError, ParameterSet, ParameterValue};
use crate::reading::{DeviceInfo, StructuredReading};
use log::{debug, info, warn};
use std::thread;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("inverter not ready: {0}")]
    NotReady(String),

    #[error("update failed: {0}")]
    UpdateFailed(String),

    #[error("no data has been fetched from the inverter yet")]
    NoData,

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Inverter(#[from] InverterError),
}

#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    pub update_interval: Duration,
    /// Additional connection attempts after the first one failed.
    pub connect_retries: u32,
    pub retry_delay: Duration,
    /// Loading data takes long; the first refresh after start is skipped so
    /// startup is not held up by it.
    pub skip_first_refresh: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(30),
            connect_retries: 3,
            retry_delay: Duration::from_secs(2),
            skip_first_refresh: true,
        }
    }
}

/// Owns all communication with one inverter and caches the last reading.
pub struct Coordinator<C: Connector> {
    connector: C,
    inverter: InverterConfig,
    config: CoordinatorConfig,
    parameters: ParameterSet,
    device: Option<DeviceInfo>,
    data: Option<StructuredReading>,
    first_refresh: bool,
    state: NetworkState,
}

impl<C: Connector> Coordinator<C> {
    pub fn new(connector: C, inverter: InverterConfig, config: CoordinatorConfig) -> Self {
        Self {
            connector,
            inverter,
            first_refresh: config.skip_first_refresh,
            config,
            parameters: ParameterSet::standard(),
            device: None,
            data: None,
            state: NetworkState::Unknown,
        }
    }

    pub fn inverter(&self) -> &InverterConfig {
        &self.inverter
    }

    pub fn update_interval(&self) -> Duration {
        self.config.update_interval
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn device(&self) -> Option<&DeviceInfo> {
        self.device.as_ref()
    }

    pub fn data(&self) -> Option<&StructuredReading> {
        self.data.as_ref()
    }

    pub fn network_state(&self) -> NetworkState {
        self.state
    }

    fn set_state(&mut self, new_state: NetworkState) {
        if self.state != new_state {
            self.state = new_state;
            info!("Inverter is {new_state:?}");
        }
    }

    fn connect(&mut self) -> Result<C::Session, InverterError> {
        let mut retries = self.config.connect_retries;
        loop {
            match self.connector.connect(&self.inverter.host, self.inverter.port) {
                Ok(session) => {
                    self.set_state(NetworkState::Online);
                    return Ok(session);
                }
                Err(e) if retries > 0 => {
                    debug!("{e}, {retries} retries left");
                    retries -= 1;
                    thread::sleep(self.config.retry_delay);
                }
                Err(e) => {
                    self.set_state(NetworkState::Offline);
                    return Err(e);
                }
            }
        }
    }

    /// Identifies the inverter. Must succeed before data can be refreshed.
    pub fn setup(&mut self) -> Result<DeviceInfo, CoordinatorError> {
        info!("Getting inverter version...");
        let mut session = self.connect().map_err(|e| {
            CoordinatorError::NotReady(format!("can't get inverter version: {e}"))
        })?;

        let device = session.system_information().map_err(|e| {
            CoordinatorError::NotReady(format!("inverter did not return its version: {e}"))
        })?;
        drop(session);

        if !device.has_version() {
            return Err(CoordinatorError::NotReady(
                "inverter did not return its version".to_string(),
            ));
        }

        info!(
            "Inverter {} runs PCU version {}",
            device.serial, device.pcu_version
        );
        self.device = Some(device.clone());
        Ok(device)
    }

    /// Fetches a fresh reading.
    ///
    /// Returns `Ok(None)` when the refresh was skipped. On failure the
    /// previous reading is kept.
    pub fn refresh(&mut self) -> Result<Option<&StructuredReading>, CoordinatorError> {
        if self.device.is_none() {
            return Err(CoordinatorError::NotReady(
                "setup has not completed".to_string(),
            ));
        }

        if self.first_refresh {
            self.first_refresh = false;
            debug!("skipping the first refresh after load");
            return Ok(None);
        }

        info!("Fetching data from inverter...");
        let mut session = self
            .connect()
            .map_err(|e| CoordinatorError::UpdateFailed(format!("can't connect: {e}")))?;

        let reading = match session.get_status() {
            Ok(reading) => reading,
            Err(e @ (InverterError::ConnectionReset | InverterError::NotConnected)) => {
                self.set_state(NetworkState::Offline);
                return Err(CoordinatorError::UpdateFailed(e.to_string()));
            }
            Err(e) => return Err(CoordinatorError::UpdateFailed(e.to_string())),
        };
        drop(session);

        if reading.is_empty() {
            return Err(CoordinatorError::UpdateFailed(
                "can't update any values".to_string(),
            ));
        }

        info!("Data fetched!");
        self.data = Some(reading);
        Ok(self.data.as_ref())
    }

    /// Writes a control parameter.
    ///
    /// The change is only reflected by a later [`refresh`](Self::refresh).
    pub fn set_parameter(
        &mut self,
        id: &str,
        value: &ParameterValue,
    ) -> Result<(), CoordinatorError> {
        let switched_on = match &self.data {
            Some(data) => data.switched_on,
            None => return Err(CoordinatorError::NoData),
        };

        let definition = self.parameters.find(id)?;
        definition.check(value)?;
        if definition.requires_off && switched_on == Some(true) {
            return Err(InverterError::InverterIsNotOff(id.to_string()).into());
        }

        let mut session = self.connect()?;
        info!("Setting {id} to {value}");
        if let Err(e) = session.set_parameter(id, value) {
            warn!("inverter refused to set {id}: {e}");
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::Language;
    use crate::simulator::SimulatedInverter;

    fn inverter_config() -> InverterConfig {
        InverterConfig {
            host: "192.168.1.50".to_string(),
            port: 8899,
            language: Language::English,
        }
    }

    fn fast_config() -> CoordinatorConfig {
        CoordinatorConfig {
            retry_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    fn ready(inverter: &SimulatedInverter) -> Coordinator<SimulatedInverter> {
        let mut coordinator = Coordinator::new(inverter.clone(), inverter_config(), fast_config());
        coordinator.setup().unwrap();
        coordinator
    }

    #[test]
    fn default_cadence() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.update_interval, Duration::from_secs(30));
        assert_eq!(config.connect_retries, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(2));
        assert!(config.skip_first_refresh);
    }

    #[test]
    fn setup_reads_device_info() {
        let inverter = SimulatedInverter::new("ABC123", 512);
        let coordinator = ready(&inverter);

        let device = coordinator.device().unwrap();
        assert_eq!(device.serial, "ABC123");
        assert_eq!(device.pcu_version, 512);
        assert_eq!(coordinator.network_state(), NetworkState::Online);
    }

    #[test]
    fn setup_without_version_is_not_ready() {
        let inverter = SimulatedInverter::new("ABC123", 0);
        let mut coordinator = Coordinator::new(inverter, inverter_config(), fast_config());

        assert!(matches!(
            coordinator.setup(),
            Err(CoordinatorError::NotReady(_))
        ));
        assert!(coordinator.device().is_none());
    }

    #[test]
    fn setup_retries_connection() {
        let inverter = SimulatedInverter::default();
        inverter.refuse_connections(3);
        let mut coordinator = Coordinator::new(inverter.clone(), inverter_config(), fast_config());
        assert!(coordinator.setup().is_ok());

        inverter.refuse_connections(4);
        let mut coordinator = Coordinator::new(inverter, inverter_config(), fast_config());
        assert!(matches!(
            coordinator.setup(),
            Err(CoordinatorError::NotReady(_))
        ));
        assert_eq!(coordinator.network_state(), NetworkState::Offline);
    }

    #[test]
    fn refresh_requires_setup() {
        let mut coordinator =
            Coordinator::new(SimulatedInverter::default(), inverter_config(), fast_config());
        assert!(matches!(
            coordinator.refresh(),
            Err(CoordinatorError::NotReady(_))
        ));
    }

    #[test]
    fn first_refresh_is_skipped() {
        let inverter = SimulatedInverter::default();
        let mut coordinator = ready(&inverter);

        assert!(coordinator.refresh().unwrap().is_none());
        assert!(coordinator.data().is_none());

        let reading = coordinator.refresh().unwrap().unwrap();
        assert_eq!(reading.pv.len(), 2);
        assert!(coordinator.data().is_some());
    }

    #[test]
    fn failed_refresh_keeps_previous_data() {
        let inverter = SimulatedInverter::default();
        let mut coordinator = ready(&inverter);
        coordinator.refresh().unwrap();
        coordinator.refresh().unwrap();

        inverter.refuse_connections(4);
        assert!(matches!(
            coordinator.refresh(),
            Err(CoordinatorError::UpdateFailed(_))
        ));
        assert!(coordinator.data().is_some());
    }

    #[test]
    fn controls_need_data_first() {
        let inverter = SimulatedInverter::default();
        let mut coordinator = ready(&inverter);

        assert!(matches!(
            coordinator.set_parameter("inverter_switched_on", &ParameterValue::Switch(false)),
            Err(CoordinatorError::NoData)
        ));
        assert!(inverter.writes().is_empty());
    }

    #[test]
    fn write_becomes_visible_after_refresh() {
        let inverter = SimulatedInverter::default();
        let mut coordinator = ready(&inverter);
        coordinator.refresh().unwrap();
        coordinator.refresh().unwrap();

        coordinator
            .set_parameter("lower_limit_ongrid_soc", &ParameterValue::Number(35))
            .unwrap();
        assert_eq!(
            coordinator.data().unwrap().working.as_ref().unwrap().lower_limit_ongrid_soc,
            20
        );

        coordinator.refresh().unwrap();
        assert_eq!(
            coordinator.data().unwrap().working.as_ref().unwrap().lower_limit_ongrid_soc,
            35
        );
    }

    #[test]
    fn invalid_values_never_reach_the_inverter() {
        let inverter = SimulatedInverter::default();
        let mut coordinator = ready(&inverter);
        coordinator.refresh().unwrap();
        coordinator.refresh().unwrap();

        assert!(matches!(
            coordinator.set_parameter("lower_limit_ongrid_soc", &ParameterValue::Number(5)),
            Err(CoordinatorError::Parameter(ParameterError::OutOfRange { .. }))
        ));
        assert!(matches!(
            coordinator.set_parameter("turbo", &ParameterValue::Switch(true)),
            Err(CoordinatorError::Parameter(ParameterError::NotFound(_)))
        ));
        assert!(inverter.writes().is_empty());
    }

    #[test]
    fn operating_mode_requires_inverter_off() {
        let inverter = SimulatedInverter::default();
        let mut coordinator = ready(&inverter);
        coordinator.refresh().unwrap();
        coordinator.refresh().unwrap();

        let mode = ParameterValue::Option("Peak-Valley".to_string());
        assert!(matches!(
            coordinator.set_parameter("operating_mode", &mode),
            Err(CoordinatorError::Inverter(InverterError::InverterIsNotOff(_)))
        ));

        coordinator
            .set_parameter("inverter_switched_on", &ParameterValue::Switch(false))
            .unwrap();
        coordinator.refresh().unwrap();
        coordinator.set_parameter("operating_mode", &mode).unwrap();
        coordinator.refresh().unwrap();

        assert_eq!(
            coordinator.data().unwrap().working.as_ref().unwrap().operating_mode,
            4
        );
    }
}
