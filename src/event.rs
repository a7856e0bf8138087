// MIT License - Copyright (c) 2026 Peter Wright
// Bridge events

use crate::command::RemoteCommand;

/// Events emitted by the bridge as it runs.
///
/// These never reach MQTT. Subscribe via `bridge.subscribe()` to receive a
/// `tokio::sync::broadcast::Receiver<BridgeEvent>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// Broker connection established and command topic subscribed
    BrokerConnected,
    /// Broker reported loss of connection
    BrokerDisconnected,
    /// A reconnect attempt failed; the next one waits a full interval
    BrokerConnectFailed,
    /// Status translator ran after a changed status
    StatusPublished { published: usize, failed: usize },
    /// Command accepted and written to the panel
    CommandWritten(RemoteCommand),
    /// Command dropped because the partition state did not allow it
    CommandRejected(RemoteCommand),
    /// Inbound payload did not start with a known command byte
    CommandUnrecognized,
    /// Command accepted but the write channel never became ready
    CommandTimedOut(RemoteCommand),
    /// Keybus decoder could not keep up and lost data
    BufferOverflow,
    /// Panel prompted for an access code and the bridge entered it
    AccessCodeEntered,
}

/// Type alias for the broadcast sender.
pub type EventSender = tokio::sync::broadcast::Sender<BridgeEvent>;

/// Type alias for the broadcast receiver.
pub type EventReceiver = tokio::sync::broadcast::Receiver<BridgeEvent>;

/// Create a new event channel with the given capacity.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    tokio::sync::broadcast::channel(capacity)
}
