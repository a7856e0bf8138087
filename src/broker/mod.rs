// MIT License - Copyright (c) 2026 Peter Wright
// Message broker abstraction

pub mod mqtt;

use crate::error::Result;

/// An outbound status message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub topic: String,
    pub payload: &'static str,
    pub retain: bool,
}

impl StatusMessage {
    pub fn retained(topic: String, payload: &'static str) -> Self {
        Self { topic, payload, retain: true }
    }

    pub fn transient(topic: String, payload: &'static str) -> Self {
        Self { topic, payload, retain: false }
    }
}

/// A message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Anything status messages can be published to.
pub trait Publish {
    /// Queue one message. Returns false if it could not be handed to the broker.
    fn publish(&mut self, message: &StatusMessage) -> bool;
}

/// Collects messages in memory.
impl Publish for Vec<StatusMessage> {
    fn publish(&mut self, message: &StatusMessage) -> bool {
        self.push(message.clone());
        true
    }
}

/// Broker client consumed by the connection supervisor.
///
/// Inbound messages are returned from [`Broker::poll`] rather than delivered
/// through a callback, so the caller handles them with its own state in hand.
#[allow(async_fn_in_trait)]
pub trait Broker: Publish {
    /// Connect (or reconnect) to the broker. Returns true once the broker accepted.
    async fn connect(&mut self, client_id: &str) -> bool;

    /// Whether the connection is currently up.
    fn connected(&self) -> bool;

    /// Subscribe to a topic on the current connection.
    fn subscribe(&mut self, topic: &str) -> Result<()>;

    /// Drive the client's event loop one step. Returns at most one inbound
    /// message; returns promptly when nothing is pending.
    async fn poll(&mut self) -> Option<InboundMessage>;
}
