// MIT License - Copyright (c) 2026 Peter Wright
// Zone status bitsets

/// Number of 8-zone groups.
pub const ZONE_GROUPS: usize = 8;

/// Highest zone number the bridge tracks.
pub const MAX_ZONES: u32 = (ZONE_GROUPS * 8) as u32;

/// Map a 1-based zone number to its (group, bit) position.
///
/// `group = (zone - 1) / 8`, `bit = (zone - 1) % 8`. Returns `None` for
/// zone 0 or zones above [`MAX_ZONES`].
pub fn zone_position(zone: u32) -> Option<(usize, u8)> {
    if zone == 0 || zone > MAX_ZONES {
        return None;
    }
    let index = zone - 1;
    Some(((index / 8) as usize, (index % 8) as u8))
}

/// Map a (group, bit) position back to its 1-based zone number.
pub fn zone_number(group: usize, bit: u8) -> u32 {
    group as u32 * 8 + bit as u32 + 1
}

/// Open/closed state of all zones, one bit per zone, with change bits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZoneStatus {
    /// Bit set: zone open. Bit clear: zone closed.
    pub open_zones: [u8; ZONE_GROUPS],
    /// Bit set: zone state differs from the last published value.
    pub open_zones_changed: [u8; ZONE_GROUPS],
    reported: [bool; ZONE_GROUPS],
}

impl ZoneStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the open bits of one group (0-based) and raise change bits for
    /// every zone that flipped. The first report of a group marks all of its
    /// zones changed. Returns true if any change bit was raised.
    pub fn update_group(&mut self, group: usize, open: u8) -> bool {
        let Some(current) = self.open_zones.get(group).copied() else {
            return false;
        };
        let flipped = if self.reported[group] { current ^ open } else { 0xFF };
        self.reported[group] = true;
        self.open_zones[group] = open;
        self.open_zones_changed[group] |= flipped;
        flipped != 0
    }

    /// Whether a zone (1-based) is currently open.
    pub fn is_open(&self, zone: u32) -> bool {
        zone_position(zone).is_some_and(|(group, bit)| self.open_zones[group] & (1 << bit) != 0)
    }

    /// Whether a zone (1-based) has an unpublished change.
    pub fn is_changed(&self, zone: u32) -> bool {
        zone_position(zone)
            .is_some_and(|(group, bit)| self.open_zones_changed[group] & (1 << bit) != 0)
    }

    /// Whether any zone has an unpublished change.
    pub fn has_pending_changes(&self) -> bool {
        self.open_zones_changed.iter().any(|bits| *bits != 0)
    }
}
