// MIT License - Copyright (c) 2026 Peter Wright
// Remote arm/disarm commands

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::WriteWait;
use crate::error::{BridgeError, Result};
use crate::transport::Keybus;

/// Partition whose state gates every command.
pub const COMMAND_PARTITION: u32 = 1;

/// Keypad keys for arm stay.
pub const KEYS_STAY: &str = "s";
/// Keypad keys for arm away.
pub const KEYS_AWAY: &str = "w";
/// Keypad keys for arm night.
pub const KEYS_NIGHT: &str = "n";

/// A command received on the command topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCommand {
    Stay,
    Away,
    Night,
    Disarm,
}

impl RemoteCommand {
    /// Parse from the leading byte of a raw payload (`S`, `A`, `N`, `D`).
    /// Anything after the first byte is ignored.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        match payload.first()? {
            b'S' => Some(RemoteCommand::Stay),
            b'A' => Some(RemoteCommand::Away),
            b'N' => Some(RemoteCommand::Night),
            b'D' => Some(RemoteCommand::Disarm),
            _ => None,
        }
    }

    pub fn is_arm(&self) -> bool {
        !matches!(self, RemoteCommand::Disarm)
    }

    /// Keys typed on the virtual keypad for this command.
    pub fn keys<'a>(&self, access_code: &'a str) -> &'a str {
        match self {
            RemoteCommand::Stay => KEYS_STAY,
            RemoteCommand::Away => KEYS_AWAY,
            RemoteCommand::Night => KEYS_NIGHT,
            RemoteCommand::Disarm => access_code,
        }
    }
}

impl std::fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteCommand::Stay => write!(f, "arm stay"),
            RemoteCommand::Away => write!(f, "arm away"),
            RemoteCommand::Night => write!(f, "arm night"),
            RemoteCommand::Disarm => write!(f, "disarm"),
        }
    }
}

/// What the gate did with one inbound payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Written(RemoteCommand),
    Rejected(RemoteCommand),
    Unrecognized,
}

/// Per-outcome command counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandStats {
    pub written: u64,
    pub rejected: u64,
    pub unrecognized: u64,
    pub timed_out: u64,
}

/// Validates inbound commands against partition 1 and writes accepted ones
/// to the keypad.
#[derive(Debug, Clone)]
pub struct CommandGate {
    access_code: String,
    write_wait: WriteWait,
    stats: CommandStats,
}

impl CommandGate {
    pub fn new(access_code: impl Into<String>, write_wait: WriteWait) -> Self {
        Self {
            access_code: access_code.into(),
            write_wait,
            stats: CommandStats::default(),
        }
    }

    pub fn access_code(&self) -> &str {
        &self.access_code
    }

    pub fn stats(&self) -> CommandStats {
        self.stats
    }

    /// Whether partition 1's current state allows `command`.
    ///
    /// Arming needs the partition disarmed and not counting down an exit
    /// delay; disarming needs it armed or in exit delay.
    pub fn accepts<K: Keybus>(bus: &K, command: RemoteCommand) -> bool {
        let Some(partition) = bus.state().partition(COMMAND_PARTITION) else {
            return false;
        };
        let busy = partition.armed || partition.exit_delay;
        if command.is_arm() { !busy } else { busy }
    }

    /// Handle one inbound payload.
    ///
    /// Rejected and unrecognised payloads are dropped without error. An
    /// accepted command steps the bus until it is write-ready, then writes
    /// exactly once.
    pub async fn handle<K: Keybus>(&mut self, bus: &mut K, payload: &[u8]) -> Result<CommandOutcome> {
        let Some(command) = RemoteCommand::from_payload(payload) else {
            debug!("Ignoring unrecognised command payload {:?}", payload);
            self.stats.unrecognized += 1;
            return Ok(CommandOutcome::Unrecognized);
        };

        if !Self::accepts(bus, command) {
            debug!("Dropping {command}: partition {COMMAND_PARTITION} state does not allow it");
            self.stats.rejected += 1;
            return Ok(CommandOutcome::Rejected(command));
        }

        if let Err(e) = self.wait_write_ready(bus).await {
            warn!("Dropping {command}: {e}");
            self.stats.timed_out += 1;
            return Err(e);
        }

        bus.write(command.keys(&self.access_code)).await?;
        info!("Command: {command} partition {COMMAND_PARTITION}");
        self.stats.written += 1;
        Ok(CommandOutcome::Written(command))
    }

    async fn wait_write_ready<K: Keybus>(&self, bus: &mut K) -> Result<()> {
        match self.write_wait {
            WriteWait::Unbounded => {
                spin_until_write_ready(bus).await;
                Ok(())
            }
            WriteWait::Timeout(limit) => timeout(limit, spin_until_write_ready(bus))
                .await
                .map_err(|_| BridgeError::WriteTimeout {
                    waited_ms: limit.as_millis() as u64,
                }),
        }
    }
}

async fn spin_until_write_ready<K: Keybus>(bus: &mut K) {
    while !bus.write_ready() {
        bus.process().await;
    }
}
