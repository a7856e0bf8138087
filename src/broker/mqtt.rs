// MIT License - Copyright (c) 2026 Peter Wright
// MQTT broker client

use std::time::Duration;

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, LastWill, MqttOptions, Packet, QoS};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::broker::{Broker, InboundMessage, Publish, StatusMessage};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};

/// Payload published on the availability topic after every connect.
pub const PAYLOAD_ONLINE: &str = "online";
/// Last Will payload the broker publishes when the bridge drops off.
pub const PAYLOAD_OFFLINE: &str = "offline";

/// Capacity of the rumqttc request queue.
const REQUEST_CAPACITY: usize = 256;

struct Session {
    client_id: String,
    client: AsyncClient,
    eventloop: EventLoop,
}

/// [`Broker`] backed by a rumqttc client.
///
/// rumqttc reconnects when its event loop is polled after a failure, so a
/// session is built once per client ID and reused across reconnects. rumqttc
/// does not resubscribe on reconnect; the connection supervisor does.
pub struct MqttBroker {
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
    keep_alive: Duration,
    will_topic: Option<String>,
    connect_timeout: Duration,
    step: Duration,
    session: Option<Session>,
    connected: bool,
}

impl MqttBroker {
    pub fn new(config: &BridgeConfig) -> Self {
        let credentials = match (&config.mqtt_username, &config.mqtt_password) {
            (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
            (Some(user), None) => Some((user.clone(), String::new())),
            _ => None,
        };
        Self {
            host: config.mqtt_host.clone(),
            port: config.mqtt_port,
            credentials,
            keep_alive: Duration::from_secs(config.keep_alive_secs),
            will_topic: config.topics.availability.clone(),
            connect_timeout: Duration::from_millis(config.mqtt_connect_timeout_ms),
            step: Duration::from_millis(config.mqtt_step_ms),
            session: None,
            connected: false,
        }
    }

    fn options(&self, client_id: &str) -> MqttOptions {
        let mut opts = MqttOptions::new(client_id, &self.host, self.port);
        opts.set_keep_alive(self.keep_alive);
        if let Some((user, pass)) = &self.credentials {
            opts.set_credentials(user, pass);
        }
        if let Some(topic) = &self.will_topic {
            opts.set_last_will(LastWill::new(topic, PAYLOAD_OFFLINE, QoS::AtLeastOnce, true));
        }
        opts
    }

    fn session_for(&mut self, client_id: &str) -> &mut Session {
        if self
            .session
            .as_ref()
            .is_some_and(|session| session.client_id != client_id)
        {
            self.session = None;
        }
        let options = self.options(client_id);
        self.session.get_or_insert_with(|| {
            let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
            Session {
                client_id: client_id.to_string(),
                client,
                eventloop,
            }
        })
    }
}

/// Poll the event loop until the broker answers our CONNECT.
async fn await_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        match eventloop.poll().await? {
            Event::Incoming(Packet::ConnAck(ack)) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(BridgeError::ConnectionRefused { code: ack.code })
                };
            }
            other => debug!("MQTT event while connecting: {:?}", other),
        }
    }
}

impl Publish for MqttBroker {
    fn publish(&mut self, message: &StatusMessage) -> bool {
        if !self.connected {
            return false;
        }
        let Some(session) = self.session.as_ref() else {
            return false;
        };
        match session.client.try_publish(
            message.topic.as_str(),
            QoS::AtLeastOnce,
            message.retain,
            message.payload,
        ) {
            Ok(()) => {
                debug!("MQTT publish {} = {}", message.topic, message.payload);
                true
            }
            Err(e) => {
                error!("Failed to publish to {}: {}", message.topic, e);
                false
            }
        }
    }
}

impl Broker for MqttBroker {
    async fn connect(&mut self, client_id: &str) -> bool {
        info!("Connecting to MQTT broker at {}:{}", self.host, self.port);
        let connect_timeout = self.connect_timeout;
        let session = self.session_for(client_id);

        let outcome = timeout(connect_timeout, await_connack(&mut session.eventloop)).await;
        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "MQTT broker did not answer within {}ms",
                    connect_timeout.as_millis()
                );
                // Half-open handshakes are not resumed; start clean next time.
                self.session = None;
                self.connected = false;
                return false;
            }
        };

        match result {
            Ok(()) => {
                info!("MQTT: connected as {client_id}");
                self.connected = true;
            }
            Err(e) => {
                warn!("MQTT connection failed: {e}");
                self.connected = false;
            }
        }
        self.connected
    }

    fn connected(&self) -> bool {
        self.connected
    }

    fn subscribe(&mut self, topic: &str) -> Result<()> {
        let session = self.session.as_ref().ok_or(BridgeError::NotConnected)?;
        session.client.try_subscribe(topic, QoS::AtLeastOnce)?;
        Ok(())
    }

    /// Drain ready event-loop work for up to one step, so queued publishes
    /// and their acknowledgements are flushed. Returns early with the first
    /// inbound publish.
    async fn poll(&mut self) -> Option<InboundMessage> {
        let deadline = Instant::now() + self.step;
        let session = self.session.as_mut()?;

        loop {
            let event = timeout_at(deadline, session.eventloop.poll()).await;
            match event {
                Err(_) => return None,
                Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                    return Some(InboundMessage {
                        topic: publish.topic.clone(),
                        payload: publish.payload.to_vec(),
                    });
                }
                Ok(Ok(Event::Incoming(Packet::Disconnect))) => {
                    warn!("MQTT broker sent DISCONNECT");
                    self.connected = false;
                    return None;
                }
                Ok(Ok(other)) => trace!("MQTT event: {:?}", other),
                Ok(Err(e)) => {
                    error!("MQTT event loop error: {e}");
                    self.connected = false;
                    return None;
                }
            }
        }
    }
}
