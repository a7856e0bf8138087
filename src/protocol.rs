// MIT License - Copyright (c) 2026 Peter Wright
// Keybus decoder line protocol

use crate::devices::partition::PartitionFlags;

/// One decoded line received from a networked Keybus decoder.
///
/// The decoder speaks a newline-delimited text protocol:
///
/// ```text
/// PSTT1=AW-----   partition 1 flags (see PartitionFlags)
/// ZSTT2=05        open-zone bitmap of zone group 2 (zones 9-16), hex
/// WRDY=1          write channel ready
/// ACP=1           panel is prompting for an access code
/// OVF             decoder buffer overflowed
/// ```
///
/// The bridge writes keypad input back as `KEY=<keys>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeybusLine {
    /// `PSTT<n>=<flags>` - partition status, 1-based partition number
    Partition { id: u32, flags: PartitionFlags },
    /// `ZSTT<g>=<hh>` - open zones of a group, 1-based group number
    Zones { group: u32, open: u8 },
    /// `WRDY=<0|1>`
    WriteReady(bool),
    /// `ACP=<0|1>`
    AccessCodePrompt(bool),
    /// `OVF`
    Overflow,
}

impl KeybusLine {
    /// Parse one line. Returns `None` for anything unrecognised.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line == "OVF" {
            return Some(Self::Overflow);
        }
        if let Some((id, flags)) = parse_status_update(line, "PSTT") {
            return Some(Self::Partition {
                id,
                flags: PartitionFlags::from_status_str(flags),
            });
        }
        if let Some((group, bits)) = parse_status_update(line, "ZSTT") {
            let open = u8::from_str_radix(bits, 16).ok()?;
            return Some(Self::Zones { group, open });
        }
        if let Some(value) = line.strip_prefix("WRDY=") {
            return parse_bool(value).map(Self::WriteReady);
        }
        if let Some(value) = line.strip_prefix("ACP=") {
            return parse_bool(value).map(Self::AccessCodePrompt);
        }
        None
    }
}

/// Build the wire line that types `keys` on the emulated keypad.
pub fn key_line(keys: &str) -> String {
    format!("KEY={}\n", keys)
}

/// Extract the entity number and value from a status line.
/// e.g., "ZSTT5=0F" → Some((5, "0F"))
pub fn parse_status_update<'a>(line: &'a str, prefix: &str) -> Option<(u32, &'a str)> {
    let after_prefix = line.strip_prefix(prefix)?;
    let (id_str, status) = after_prefix.split_once('=')?;
    id_str.parse::<u32>().ok().map(|id| (id, status))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    }
}
