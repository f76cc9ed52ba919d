use crate::coordinator::{Coordinator, CoordinatorError};
use crate::home_assistant::ControlCommand;
use crate::inverter::{Connector, InverterError};
use crate::metric_collector::MetricCollector;
use crate::reading::DeviceInfo;
use log::{error, info, warn};
use std::thread;
use std::time::{Duration, Instant};

const COMMAND_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Moves readings from a coordinator to the publishing targets and control
/// commands the other way.
pub struct Bridge<C: Connector> {
    coordinator: Coordinator<C>,
    targets: Vec<Box<dyn MetricCollector>>,
    command_poll_interval: Duration,
}

impl<C: Connector> Bridge<C> {
    pub fn new(coordinator: Coordinator<C>, targets: Vec<Box<dyn MetricCollector>>) -> Self {
        Self {
            coordinator,
            targets,
            command_poll_interval: COMMAND_POLL_INTERVAL,
        }
    }

    pub fn coordinator(&self) -> &Coordinator<C> {
        &self.coordinator
    }

    /// Identifies the inverter and announces it to every target.
    pub fn setup(&mut self) -> Result<DeviceInfo, CoordinatorError> {
        let device = self.coordinator.setup()?;
        for target in self.targets.iter_mut() {
            target.announce(&device);
        }
        Ok(device)
    }

    /// Fetches a reading and hands it to every target. Failures are logged,
    /// the previous data stays in place and targets mark it unavailable.
    pub fn refresh(&mut self) {
        let device = match self.coordinator.device() {
            Some(device) => device.clone(),
            None => {
                warn!("refresh requested before setup");
                return;
            }
        };

        match self.coordinator.refresh() {
            Ok(Some(reading)) => {
                for target in self.targets.iter_mut() {
                    target.publish(&device, reading);
                }
            }
            Ok(None) => {}
            Err(e @ CoordinatorError::UpdateFailed(_)) => {
                warn!("{e}");
                for target in self.targets.iter_mut() {
                    target.unavailable(&device);
                }
            }
            Err(e) => warn!("{e}"),
        }
    }

    /// Applies every command received since the last call and returns how
    /// many were accepted by the inverter.
    pub fn handle_commands(&mut self) -> usize {
        let commands: Vec<ControlCommand> = self
            .targets
            .iter_mut()
            .flat_map(|target| target.commands())
            .collect();

        let mut applied = 0;
        for command in commands {
            match self.coordinator.set_parameter(&command.key, &command.value) {
                Ok(()) => applied += 1,
                Err(
                    e @ CoordinatorError::Inverter(
                        InverterError::Rejected(_)
                        | InverterError::FailedResponseIntegrityCheck
                        | InverterError::PcuVersionMalformed,
                    ),
                ) => error!(
                    "setting {} failed: {e}. Please file an issue with your inverter model and firmware version",
                    command.key
                ),
                Err(e) => warn!("setting {} to {} failed: {e}", command.key, command.value),
            }
        }
        applied
    }

    /// Runs forever: sets the inverter up, then refreshes once per update
    /// interval and applies commands in between.
    pub fn run(&mut self) {
        let interval = self.coordinator.update_interval();

        loop {
            match self.setup() {
                Ok(_) => break,
                Err(e) => {
                    warn!("{e}, retrying in {:.0}s", interval.as_secs_f64());
                    thread::sleep(interval);
                }
            }
        }

        info!(
            "Refreshing every {:.2}s",
            interval.as_secs_f64()
        );
        loop {
            self.refresh();

            let deadline = Instant::now() + interval;
            loop {
                self.handle_commands();
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                thread::sleep(remaining.min(self.command_poll_interval));
            }
        }
    }
}
