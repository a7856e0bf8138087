// MIT License - Copyright (c) 2026 Peter Wright
// Panel devices

pub mod partition;
pub mod zone;

pub use partition::{PartitionFlags, PartitionStatus, MAX_PARTITIONS};
pub use zone::{ZoneStatus, MAX_ZONES, ZONE_GROUPS};
