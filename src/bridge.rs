// MIT License - Copyright (c) 2026 Peter Wright
// Bridge main loop

use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::broker::Broker;
use crate::command::{CommandGate, CommandOutcome, CommandStats, RemoteCommand};
use crate::config::{BridgeConfig, PublishPolicy};
use crate::error::{BridgeError, Result};
use crate::event::{event_channel, BridgeEvent, EventReceiver, EventSender};
use crate::supervisor::ConnectionSupervisor;
use crate::transport::Keybus;
use crate::translator::{StatusTranslator, TranslateSummary};

/// Ties one keybus to one broker.
///
/// Everything runs on the caller's task: each [`Bridge::cycle`] steps the
/// broker connection, handles at most one inbound command, steps the bus
/// and publishes whatever changed.
pub struct Bridge<K: Keybus, B: Broker> {
    bus: K,
    broker: B,
    translator: StatusTranslator,
    gate: CommandGate,
    supervisor: ConnectionSupervisor,
    event_tx: EventSender,
}

impl<K: Keybus, B: Broker> Bridge<K, B> {
    pub fn new(config: &BridgeConfig, bus: K, broker: B) -> Self {
        let (event_tx, _event_rx) = event_channel(256);
        let supervisor = ConnectionSupervisor::new(
            config.client_id.clone(),
            &config.topics,
            config.reconnect_interval(),
            Instant::now(),
            event_tx.clone(),
        );
        Self {
            bus,
            broker,
            translator: StatusTranslator::new(config.topics.clone(), config.publish_policy),
            gate: CommandGate::new(config.access_code.clone(), config.write_wait),
            supervisor,
            event_tx,
        }
    }

    /// Subscribe to bridge events.
    pub fn subscribe(&self) -> EventReceiver {
        self.event_tx.subscribe()
    }

    pub fn bus(&self) -> &K {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut K {
        &mut self.bus
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    pub fn broker_mut(&mut self) -> &mut B {
        &mut self.broker
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor {
        &self.supervisor
    }

    pub fn command_stats(&self) -> CommandStats {
        self.gate.stats()
    }

    /// Start the keybus and make the first broker connect attempt, so the
    /// first status reports are published rather than lost. A failed attempt
    /// is retried by the supervisor after the reconnect interval.
    pub async fn begin(&mut self) -> Result<()> {
        self.bus.begin().await?;
        info!("Keybus started");
        self.supervisor.connect(&mut self.broker, Instant::now()).await;
        Ok(())
    }

    /// Start the keybus, then cycle forever.
    pub async fn run(&mut self) -> Result<()> {
        self.begin().await?;
        loop {
            self.cycle(Instant::now()).await;
        }
    }

    /// One pass of the bridge loop. Returns the translator summary when the
    /// translator ran this cycle.
    ///
    /// Besides changed status, the translator also runs under
    /// [`PublishPolicy::RetryUntilSuccess`] whenever the broker is connected
    /// and earlier publishes are still pending.
    pub async fn cycle(&mut self, now: Instant) -> Option<TranslateSummary> {
        if let Some(message) = self.supervisor.poll(&mut self.broker, now).await {
            self.handle_command(&message.payload).await;
        }

        self.bus.process().await;
        if self.bus.state().status_changed {
            return Some(self.handle_status_change().await);
        }
        if self.retry_pending() {
            debug!("Retrying unpublished status");
            return Some(self.publish_status());
        }
        None
    }

    fn retry_pending(&self) -> bool {
        self.translator.policy() == PublishPolicy::RetryUntilSuccess
            && self.supervisor.is_connected()
            && self.bus.state().has_pending_changes()
    }

    async fn handle_command(&mut self, payload: &[u8]) {
        let event = match self.gate.handle(&mut self.bus, payload).await {
            Ok(CommandOutcome::Written(command)) => BridgeEvent::CommandWritten(command),
            Ok(CommandOutcome::Rejected(command)) => BridgeEvent::CommandRejected(command),
            Ok(CommandOutcome::Unrecognized) => BridgeEvent::CommandUnrecognized,
            Err(BridgeError::WriteTimeout { .. }) => match RemoteCommand::from_payload(payload) {
                Some(command) => BridgeEvent::CommandTimedOut(command),
                None => return,
            },
            Err(e) if e.is_retryable() => {
                warn!("Command write failed: {e}");
                return;
            }
            Err(e) => {
                error!("Command write failed: {e}");
                return;
            }
        };
        let _ = self.event_tx.send(event);
    }

    async fn handle_status_change(&mut self) -> TranslateSummary {
        let state = self.bus.state_mut();
        state.status_changed = false;

        if state.buffer_overflow {
            warn!("Keybus buffer overflow, status updates were lost");
            state.buffer_overflow = false;
            let _ = self.event_tx.send(BridgeEvent::BufferOverflow);
        }

        if self.bus.state().access_code_prompt && self.bus.write_ready() {
            self.bus.state_mut().access_code_prompt = false;
            match self.bus.write(self.gate.access_code()).await {
                Ok(()) => {
                    info!("Entered access code at panel prompt");
                    let _ = self.event_tx.send(BridgeEvent::AccessCodeEntered);
                }
                Err(e) => warn!("Failed to enter access code: {e}"),
            }
        }

        self.publish_status()
    }

    fn publish_status(&mut self) -> TranslateSummary {
        let summary = self.translator.translate(self.bus.state_mut(), &mut self.broker);
        if !summary.is_empty() {
            debug!(
                "Status published: {} sent, {} failed",
                summary.published, summary.failed
            );
            let _ = self.event_tx.send(BridgeEvent::StatusPublished {
                published: summary.published,
                failed: summary.failed,
            });
        }
        summary
    }
}
