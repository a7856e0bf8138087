// MIT License - Copyright (c) 2026 Peter Wright
// Panel status → MQTT translation

use tracing::{debug, warn};

use crate::broker::{Publish, StatusMessage};
use crate::config::{PublishPolicy, Topics};
use crate::devices::partition::PartitionStatus;
use crate::devices::zone::{zone_number, ZONE_GROUPS};
use crate::panel::PanelState;

/// Partition armed away or stay with no entry delay.
pub const PAYLOAD_ARMED_NIGHT: &str = "NA";
pub const PAYLOAD_ARMED_AWAY: &str = "AA";
pub const PAYLOAD_ARMED_STAY: &str = "SA";
pub const PAYLOAD_DISARMED: &str = "D";
pub const PAYLOAD_TRIPPED: &str = "T";
/// Fire tripped / zone open.
pub const PAYLOAD_ON: &str = "1";
/// Fire restored / zone closed.
pub const PAYLOAD_OFF: &str = "0";

/// Outcome of one translator run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranslateSummary {
    pub published: usize,
    pub failed: usize,
}

impl TranslateSummary {
    pub fn is_empty(&self) -> bool {
        self.published == 0 && self.failed == 0
    }
}

/// Payload for a partition's armed dimension.
///
/// Checked in fixed priority: away+night, away, stay+night, stay. Armed with
/// neither mode set yields `None`.
pub fn armed_payload(partition: &PartitionStatus) -> Option<&'static str> {
    if !partition.armed {
        return Some(PAYLOAD_DISARMED);
    }
    if partition.armed_away && partition.no_entry_delay {
        Some(PAYLOAD_ARMED_NIGHT)
    } else if partition.armed_away {
        Some(PAYLOAD_ARMED_AWAY)
    } else if partition.armed_stay && partition.no_entry_delay {
        Some(PAYLOAD_ARMED_NIGHT)
    } else if partition.armed_stay {
        Some(PAYLOAD_ARMED_STAY)
    } else {
        None
    }
}

/// Turns change markers in a [`PanelState`] into status messages.
#[derive(Debug, Clone)]
pub struct StatusTranslator {
    topics: Topics,
    policy: PublishPolicy,
}

impl StatusTranslator {
    pub fn new(topics: Topics, policy: PublishPolicy) -> Self {
        Self { topics, policy }
    }

    pub fn policy(&self) -> PublishPolicy {
        self.policy
    }

    /// Publish every pending change and clear the markers acted on.
    ///
    /// Partitions go first in ascending order (armed, alarm, fire), then
    /// zones 1..=64. A second run with no new changes publishes nothing.
    pub fn translate<P: Publish>(&self, state: &mut PanelState, out: &mut P) -> TranslateSummary {
        let mut summary = TranslateSummary::default();

        for (index, partition) in state.partitions.iter_mut().enumerate() {
            let id = index + 1;

            if partition.armed_changed {
                partition.armed_changed = match armed_payload(partition) {
                    Some(payload) => {
                        let message = StatusMessage::retained(self.topics.partition(id), payload);
                        !self.emit(out, &message, &mut summary)
                    }
                    None => {
                        debug!("Partition {id} armed without a known arm mode");
                        false
                    }
                };
            }

            if partition.alarm_changed {
                partition.alarm_changed = partition.alarm_tripped && {
                    let message = StatusMessage::retained(self.topics.partition(id), PAYLOAD_TRIPPED);
                    !self.emit(out, &message, &mut summary)
                };
            }

            if partition.fire_changed {
                let payload = if partition.fire_tripped { PAYLOAD_ON } else { PAYLOAD_OFF };
                let message = StatusMessage::transient(self.topics.fire(id), payload);
                partition.fire_changed = !self.emit(out, &message, &mut summary);
            }
        }

        let zones = &mut state.zones;
        for group in 0..ZONE_GROUPS {
            let changed = zones.open_zones_changed[group];
            if changed == 0 {
                continue;
            }
            for bit in 0..8u8 {
                let mask = 1 << bit;
                if changed & mask == 0 {
                    continue;
                }
                let payload = if zones.open_zones[group] & mask != 0 { PAYLOAD_ON } else { PAYLOAD_OFF };
                let message = StatusMessage::retained(self.topics.zone(zone_number(group, bit)), payload);
                if self.emit(out, &message, &mut summary) {
                    zones.open_zones_changed[group] &= !mask;
                }
            }
        }

        summary
    }

    /// Publish one message. Returns whether its change marker may be cleared.
    fn emit<P: Publish>(&self, out: &mut P, message: &StatusMessage, summary: &mut TranslateSummary) -> bool {
        if out.publish(message) {
            summary.published += 1;
            return true;
        }
        summary.failed += 1;
        match self.policy {
            PublishPolicy::FireAndForget => {
                warn!("Publish to {} failed, dropping", message.topic);
                true
            }
            PublishPolicy::RetryUntilSuccess => {
                warn!("Publish to {} failed, will retry", message.topic);
                false
            }
        }
    }
}
