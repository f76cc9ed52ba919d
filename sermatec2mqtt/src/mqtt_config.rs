use rand::{distributions::Alphanumeric, thread_rng, Rng};
use serde_derive::Deserialize;

fn default_base_topic() -> String {
    "sermatec".into()
}

fn default_client_id() -> String {
    format!(
        "sermatec-mqtt-{}",
        thread_rng()
            .sample_iter(&Alphanumeric)
            .take(5)
            .map(char::from)
            .collect::<String>()
    )
}

#[derive(Clone, Debug, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: Option<bool>,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Prefix of the per-value topics of the simple MQTT target.
    #[serde(default = "default_base_topic")]
    pub base_topic: String,
}

impl MqttConfig {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            port: None,
            username: None,
            password: None,
            tls: None,
            client_id: default_client_id(),
            base_topic: default_base_topic(),
        }
    }

    pub fn use_tls(&self) -> bool {
        self.tls.is_some_and(|tls| tls)
    }

    pub fn port_or_default(&self) -> u16 {
        self.port
            .unwrap_or(if self.use_tls() { 8883 } else { 1883 })
    }

    /// A broker host is required, and a password makes no sense without a user.
    pub fn is_valid(&self) -> bool {
        !self.host.trim().is_empty() && !(self.username.is_none() && self.password.is_some())
    }
}
