// MIT License - Copyright (c) 2026 Peter Wright
// Broker connection supervisor

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::broker::mqtt::PAYLOAD_ONLINE;
use crate::broker::{Broker, InboundMessage, StatusMessage};
use crate::config::Topics;
use crate::event::{BridgeEvent, EventSender};

/// Broker connection state as seen by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    /// Waiting for the reconnect interval to elapse
    DisconnectedWaiting,
    /// A reconnect attempt is in flight
    DisconnectedRetrying,
}

/// Keeps the broker connected, with a fixed reconnect interval and no retry
/// limit, and resubscribes to the command topic after every reconnect.
pub struct ConnectionSupervisor {
    client_id: String,
    command_topic: String,
    availability_topic: Option<String>,
    interval: Duration,
    state: ConnectionState,
    /// `None` right after a loss of connection, so the first attempt is immediate.
    last_attempt: Option<Instant>,
    event_tx: EventSender,
}

impl ConnectionSupervisor {
    /// A new supervisor starts disconnected, with the creation time as its
    /// last attempt.
    pub fn new(
        client_id: impl Into<String>,
        topics: &Topics,
        interval: Duration,
        now: Instant,
        event_tx: EventSender,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            command_topic: topics.command.clone(),
            availability_topic: topics.availability.clone(),
            interval,
            state: ConnectionState::DisconnectedWaiting,
            last_attempt: Some(now),
            event_tx,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Whether a reconnect attempt is due at `now`.
    pub fn reconnect_due(&self, now: Instant) -> bool {
        self.state != ConnectionState::Connected
            && self
                .last_attempt
                .is_none_or(|at| now.saturating_duration_since(at) >= self.interval)
    }

    /// Attempt one connect. On success subscribe to the command topic and
    /// announce availability.
    pub async fn connect<B: Broker>(&mut self, broker: &mut B, now: Instant) -> bool {
        self.state = ConnectionState::DisconnectedRetrying;
        debug!("MQTT: connecting as {}", self.client_id);

        if !broker.connect(&self.client_id).await {
            warn!(
                "MQTT: connection failed, retrying in {:.1}s",
                self.interval.as_secs_f64()
            );
            self.state = ConnectionState::DisconnectedWaiting;
            self.last_attempt = Some(now);
            let _ = self.event_tx.send(BridgeEvent::BrokerConnectFailed);
            return false;
        }

        if let Err(e) = broker.subscribe(&self.command_topic) {
            warn!("MQTT: subscribe to {} failed: {e}", self.command_topic);
        }
        if let Some(topic) = &self.availability_topic
            && !broker.publish(&StatusMessage::retained(topic.clone(), PAYLOAD_ONLINE))
        {
            warn!("MQTT: failed to announce availability on {topic}");
        }

        info!("MQTT: subscribed to {}", self.command_topic);
        self.state = ConnectionState::Connected;
        self.last_attempt = None;
        let _ = self.event_tx.send(BridgeEvent::BrokerConnected);
        true
    }

    /// One supervisor step.
    ///
    /// Connected: drive the broker one step and return a message addressed
    /// to the command topic, if any. Disconnected: attempt a reconnect once
    /// the interval has elapsed, otherwise return immediately.
    pub async fn poll<B: Broker>(&mut self, broker: &mut B, now: Instant) -> Option<InboundMessage> {
        if self.is_connected() && !broker.connected() {
            self.mark_disconnected();
        }

        if !self.is_connected() {
            if !self.reconnect_due(now) {
                return None;
            }
            if !self.connect(broker, now).await {
                return None;
            }
        }

        let message = broker.poll().await;
        if !broker.connected() {
            self.mark_disconnected();
        }

        let message = message?;
        if message.topic != self.command_topic {
            debug!("MQTT: ignoring message on {}", message.topic);
            return None;
        }
        Some(message)
    }

    fn mark_disconnected(&mut self) {
        warn!("MQTT: connection lost");
        self.state = ConnectionState::DisconnectedWaiting;
        self.last_attempt = None;
        let _ = self.event_tx.send(BridgeEvent::BrokerDisconnected);
    }
}
