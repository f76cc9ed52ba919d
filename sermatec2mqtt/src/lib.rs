// externally visible interfaces
pub mod bridge;
pub mod coordinator;
pub mod entities;
pub mod home_assistant;
pub mod i18n;
pub mod integration_config;
pub mod inverter;
pub mod metric_collector;
pub mod mqtt_config;
pub mod mqtt_wrapper;
pub mod parameters;
pub mod reading;
pub mod simple_mqtt;
pub mod simulator;

// internal interfaces
mod home_assistant_config;
