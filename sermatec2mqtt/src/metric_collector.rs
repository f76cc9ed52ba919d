use crate::home_assistant::ControlCommand;
use crate::reading::{DeviceInfo, StructuredReading};

/// A destination for inverter readings.
pub trait MetricCollector {
    /// Makes the inverter known to the target before any reading arrives.
    fn announce(&mut self, _device: &DeviceInfo) {}

    fn publish(&mut self, device: &DeviceInfo, reading: &StructuredReading);

    /// Called when a refresh failed and the published values are stale.
    fn unavailable(&mut self, _device: &DeviceInfo) {}

    /// Control requests received since the last call. Targets without
    /// controls never return any.
    fn commands(&mut self) -> Vec<ControlCommand> {
        Vec::new()
    }
}
