// MIT License - Copyright (c) 2026 Peter Wright
// Partition status

use bitflags::bitflags;

/// Number of partitions the bridge tracks.
pub const MAX_PARTITIONS: usize = 8;

bitflags! {
    /// Partition flags as reported by the keybus decoder.
    ///
    /// Flag characters: `A W H N X a F`, `-` is filler.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PartitionFlags: u8 {
        /// A - Armed
        const ARMED          = 0b0000_0001;
        /// W - Armed away
        const AWAY           = 0b0000_0010;
        /// H - Armed stay (home)
        const STAY           = 0b0000_0100;
        /// N - No entry delay (night)
        const NO_ENTRY_DELAY = 0b0000_1000;
        /// X - Exit delay in progress
        const EXIT_DELAY     = 0b0001_0000;
        /// a - Alarm tripped
        const ALARM          = 0b0010_0000;
        /// F - Fire
        const FIRE           = 0b0100_0000;
    }
}

const PARTITION_FLAG_CHARS: [(char, PartitionFlags); 7] = [
    ('A', PartitionFlags::ARMED),
    ('W', PartitionFlags::AWAY),
    ('H', PartitionFlags::STAY),
    ('N', PartitionFlags::NO_ENTRY_DELAY),
    ('X', PartitionFlags::EXIT_DELAY),
    ('a', PartitionFlags::ALARM),
    ('F', PartitionFlags::FIRE),
];

impl PartitionFlags {
    /// Parse a partition flag string (e.g. "AW-----") into flags.
    /// Unknown characters are ignored.
    pub fn from_status_str(s: &str) -> Self {
        let mut flags = Self::empty();
        for (ch, flag) in &PARTITION_FLAG_CHARS {
            if s.contains(*ch) {
                flags |= *flag;
            }
        }
        flags
    }
}

/// Status of one partition plus the change markers the translator consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionStatus {
    pub armed: bool,
    pub armed_away: bool,
    pub armed_stay: bool,
    pub no_entry_delay: bool,
    pub exit_delay: bool,
    pub alarm_tripped: bool,
    pub fire_tripped: bool,
    pub armed_changed: bool,
    pub alarm_changed: bool,
    pub fire_changed: bool,
    reported: bool,
}

impl PartitionStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a decoded flag set, raising change markers for every dimension
    /// that differs from the previous report.
    ///
    /// The first report raises all markers so retained topics get seeded.
    /// Markers are only ever raised here; clearing is the translator's job.
    /// Returns true if anything changed, exit delay included.
    pub fn update(&mut self, flags: PartitionFlags) -> bool {
        let first = !self.reported;
        self.reported = true;

        let armed = flags.contains(PartitionFlags::ARMED);
        let away = flags.contains(PartitionFlags::AWAY);
        let stay = flags.contains(PartitionFlags::STAY);
        let night = flags.contains(PartitionFlags::NO_ENTRY_DELAY);
        let exit_delay = flags.contains(PartitionFlags::EXIT_DELAY);
        let alarm = flags.contains(PartitionFlags::ALARM);
        let fire = flags.contains(PartitionFlags::FIRE);

        let armed_differs = first
            || armed != self.armed
            || away != self.armed_away
            || stay != self.armed_stay
            || night != self.no_entry_delay;
        let alarm_differs = first || alarm != self.alarm_tripped;
        let fire_differs = first || fire != self.fire_tripped;
        let exit_differs = exit_delay != self.exit_delay;

        self.armed = armed;
        self.armed_away = away;
        self.armed_stay = stay;
        self.no_entry_delay = night;
        self.exit_delay = exit_delay;
        self.alarm_tripped = alarm;
        self.fire_tripped = fire;

        self.armed_changed |= armed_differs;
        self.alarm_changed |= alarm_differs;
        self.fire_changed |= fire_differs;

        armed_differs || alarm_differs || fire_differs || exit_differs
    }

    /// Whether any change marker is waiting to be published.
    pub fn has_pending_changes(&self) -> bool {
        self.armed_changed || self.alarm_changed || self.fire_changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_flags_from_str() {
        let flags = PartitionFlags::from_status_str("AW-N---");
        assert!(flags.contains(PartitionFlags::ARMED));
        assert!(flags.contains(PartitionFlags::AWAY));
        assert!(flags.contains(PartitionFlags::NO_ENTRY_DELAY));
        assert!(!flags.contains(PartitionFlags::STAY));
    }

    #[test]
    fn test_alarm_and_armed_are_case_sensitive() {
        let flags = PartitionFlags::from_status_str("-----a-");
        assert_eq!(flags, PartitionFlags::ALARM);
        let flags = PartitionFlags::from_status_str("-------");
        assert_eq!(flags, PartitionFlags::empty());
    }

    #[test]
    fn test_first_update_marks_everything_changed() {
        let mut part = PartitionStatus::new();
        assert!(part.update(PartitionFlags::empty()));
        assert!(part.armed_changed);
        assert!(part.alarm_changed);
        assert!(part.fire_changed);
    }

    #[test]
    fn test_update_marks_only_differing_dimensions() {
        let mut part = PartitionStatus::new();
        part.update(PartitionFlags::empty());
        part.armed_changed = false;
        part.alarm_changed = false;
        part.fire_changed = false;

        assert!(part.update(PartitionFlags::ARMED | PartitionFlags::STAY));
        assert!(part.armed_changed);
        assert!(!part.alarm_changed);
        assert!(!part.fire_changed);
        assert!(part.armed && part.armed_stay);

        part.armed_changed = false;
        assert!(!part.update(PartitionFlags::ARMED | PartitionFlags::STAY));
        assert!(!part.has_pending_changes());
    }

    #[test]
    fn test_night_mode_change_marks_armed() {
        let mut part = PartitionStatus::new();
        part.update(PartitionFlags::ARMED | PartitionFlags::STAY);
        part.armed_changed = false;

        part.update(PartitionFlags::ARMED | PartitionFlags::STAY | PartitionFlags::NO_ENTRY_DELAY);
        assert!(part.armed_changed);
    }

    #[test]
    fn test_exit_delay_change_is_reported_without_markers() {
        let mut part = PartitionStatus::new();
        part.update(PartitionFlags::empty());
        part.armed_changed = false;
        part.alarm_changed = false;
        part.fire_changed = false;

        assert!(part.update(PartitionFlags::EXIT_DELAY));
        assert!(part.exit_delay);
        assert!(!part.has_pending_changes());
    }

    #[test]
    fn test_unpublished_marker_survives_revert() {
        let mut part = PartitionStatus::new();
        part.update(PartitionFlags::empty());
        part.fire_changed = false;

        part.update(PartitionFlags::FIRE);
        part.update(PartitionFlags::empty());
        assert!(part.fire_changed);
        assert!(!part.fire_tripped);
    }
}
