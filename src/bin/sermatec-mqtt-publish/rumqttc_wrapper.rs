use std::{
    sync::{mpsc::Sender, Arc, Mutex},
    thread,
    time::Duration,
};

use log::{debug, info, warn};
use rumqttc::{
    tokio_rustls::{self, rustls::ClientConfig},
    Client, Event, Incoming, MqttOptions, Transport,
};
use sermatec2mqtt::{
    mqtt_config::MqttConfig,
    mqtt_wrapper::{self, PublishEvent},
};

type Subscriptions = Arc<Mutex<Vec<(String, rumqttc::QoS)>>>;

pub struct RumqttcWrapper {
    client: Client,
    subscriptions: Subscriptions,
}

fn match_qos(qos: mqtt_wrapper::QoS) -> rumqttc::QoS {
    match qos {
        mqtt_wrapper::QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        mqtt_wrapper::QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        mqtt_wrapper::QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

fn from_rumqttc_qos(qos: rumqttc::QoS) -> mqtt_wrapper::QoS {
    match qos {
        rumqttc::QoS::AtMostOnce => mqtt_wrapper::QoS::AtMostOnce,
        rumqttc::QoS::AtLeastOnce => mqtt_wrapper::QoS::AtLeastOnce,
        rumqttc::QoS::ExactlyOnce => mqtt_wrapper::QoS::ExactlyOnce,
    }
}

fn tls_transport() -> Transport {
    // Use rustls-native-certs to load root certificates from the operating system.
    let mut roots = tokio_rustls::rustls::RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for e in &native.errors {
        warn!("could not load platform certificate: {e}");
    }
    for cert in native.certs {
        if let Err(e) = roots.add(cert) {
            warn!("skipping platform certificate: {e}");
        }
    }

    let client_config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Transport::tls_with_config(client_config.into())
}

impl mqtt_wrapper::MqttWrapper for RumqttcWrapper {
    fn subscribe(&mut self, topic: &str, qos: mqtt_wrapper::QoS) -> anyhow::Result<()> {
        let qos = match_qos(qos);
        self.subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((topic.to_string(), qos));
        Ok(self.client.subscribe(topic, qos)?)
    }

    fn publish<S, V>(
        &mut self,
        topic: S,
        qos: mqtt_wrapper::QoS,
        retain: bool,
        payload: V,
    ) -> anyhow::Result<()>
    where
        S: Clone + Into<String>,
        V: Clone + Into<Vec<u8>>,
    {
        // try publishing up to three times
        for _ in 0..2 {
            if self
                .client
                .try_publish(topic.clone(), match_qos(qos), retain, payload.clone())
                .is_ok()
            {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(100));
        }
        Ok(self
            .client
            .try_publish(topic, match_qos(qos), retain, payload)?)
    }

    fn new(config: &MqttConfig, suffix: &str, pub_tx: Sender<PublishEvent>) -> Self {
        let mut mqttoptions = MqttOptions::new(
            config.client_id.clone() + suffix,
            &config.host,
            config.port_or_default(),
        );
        mqttoptions.set_keep_alive(Duration::from_secs(5));
        if config.use_tls() {
            mqttoptions.set_transport(tls_transport());
        }

        //parse the mqtt authentication options
        if let Some((username, password)) = match (&config.username, &config.password) {
            (None, None) => None,
            (None, Some(_)) => None,
            (Some(username), None) => Some((username.clone(), "".into())),
            (Some(username), Some(password)) => Some((username.clone(), password.clone())),
        } {
            mqttoptions.set_credentials(username, password);
        }

        let (client, mut connection) = Client::new(mqttoptions, 512);
        let subscriptions: Subscriptions = Arc::default();

        let resubscriber = client.clone();
        let active = Arc::clone(&subscriptions);
        let broker = config.host.clone();
        thread::spawn(move || {
            // keep polling the event loop to make sure outgoing messages get sent
            // the call to .iter() blocks and suspends the thread effectively by
            // calling .recv() under the hood. This implies that the loop terminates
            // once the client unsubs
            for event in connection.iter() {
                match event {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        info!("connected to MQTT broker {broker}");
                        // a clean session forgets subscriptions on reconnect
                        let topics = active
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner())
                            .clone();
                        for (topic, qos) in topics {
                            if let Err(e) = resubscriber.try_subscribe(topic.clone(), qos) {
                                warn!("resubscription to {topic} failed: {e}");
                            }
                        }
                    }
                    Ok(Event::Incoming(Incoming::Publish(packet))) => {
                        let event = PublishEvent {
                            topic: packet.topic,
                            qos: from_rumqttc_qos(packet.qos),
                            retain: packet.retain,
                            payload: packet.payload,
                        };
                        if pub_tx.send(event).is_err() {
                            debug!("nobody listens for incoming messages");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("MQTT connection error: {e}");
                        thread::sleep(Duration::from_secs(1));
                    }
                }
            }
        });

        Self {
            client,
            subscriptions,
        }
    }
}
