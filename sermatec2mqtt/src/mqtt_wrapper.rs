use crate::mqtt_config::MqttConfig;
use bytes::Bytes;
use std::sync::mpsc::Sender;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

/// A message received on one of the subscribed topics.
#[derive(Clone, Debug)]
pub struct PublishEvent {
    pub topic: String,
    pub qos: QoS,
    pub retain: bool,
    pub payload: Bytes,
}

/// Decouples library code from the MQTT client implementation.
///
/// Binaries wrap their client in a new type implementing this trait. Messages
/// arriving on subscribed topics are forwarded through `pub_tx`.
pub trait MqttWrapper {
    fn subscribe(&mut self, topic: &str, qos: QoS) -> anyhow::Result<()>;

    fn publish<S, V>(&mut self, topic: S, qos: QoS, retain: bool, payload: V) -> anyhow::Result<()>
    where
        S: Clone + Into<String>,
        V: Clone + Into<Vec<u8>>;

    fn new(config: &MqttConfig, suffix: &str, pub_tx: Sender<PublishEvent>) -> Self;
}
