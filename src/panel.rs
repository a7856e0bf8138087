// MIT License - Copyright (c) 2026 Peter Wright
// Panel state snapshot

use tracing::debug;

use crate::devices::partition::{PartitionStatus, MAX_PARTITIONS};
use crate::devices::zone::ZoneStatus;
use crate::protocol::KeybusLine;

/// In-memory snapshot of everything the keybus has reported.
///
/// Written by the keybus implementation as it decodes, read by the status
/// translator, which clears the change markers it publishes. Both run on
/// the bridge task, so the snapshot is reached through `&mut` and never
/// locked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelState {
    /// A decoded unit changed something the bridge should look at
    pub status_changed: bool,
    /// Decoder dropped data because it was not polled often enough
    pub buffer_overflow: bool,
    /// Panel is waiting for an access code
    pub access_code_prompt: bool,
    /// Panel write channel can accept a keypad write
    pub write_ready: bool,
    pub partitions: [PartitionStatus; MAX_PARTITIONS],
    pub zones: ZoneStatus,
}

impl PanelState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a partition by ID (1-indexed).
    pub fn partition(&self, id: u32) -> Option<&PartitionStatus> {
        self.partitions.get((id as usize).wrapping_sub(1))
    }

    /// Get a mutable partition by ID (1-indexed).
    pub fn partition_mut(&mut self, id: u32) -> Option<&mut PartitionStatus> {
        self.partitions.get_mut((id as usize).wrapping_sub(1))
    }

    /// Whether any partition or zone change marker is still unpublished.
    pub fn has_pending_changes(&self) -> bool {
        self.partitions.iter().any(PartitionStatus::has_pending_changes)
            || self.zones.has_pending_changes()
    }

    /// Fold one decoded line into the snapshot.
    ///
    /// Sets `status_changed` when the line changed partition or zone status,
    /// raised an access-code prompt, or reported an overflow. Returns whether
    /// it did.
    pub fn apply(&mut self, line: &KeybusLine) -> bool {
        let changed = match *line {
            KeybusLine::Partition { id, flags } => match self.partition_mut(id) {
                Some(part) => part.update(flags),
                None => {
                    debug!("Ignoring status for partition {} (max {})", id, MAX_PARTITIONS);
                    false
                }
            },
            KeybusLine::Zones { group, open } => {
                self.zones.update_group((group as usize).wrapping_sub(1), open)
            }
            KeybusLine::WriteReady(ready) => {
                self.write_ready = ready;
                false
            }
            KeybusLine::AccessCodePrompt(prompt) => {
                self.access_code_prompt = prompt;
                prompt
            }
            KeybusLine::Overflow => {
                self.buffer_overflow = true;
                true
            }
        };
        if changed {
            self.status_changed = true;
        }
        changed
    }
}
