use serde::{Deserialize, Serialize};

/// Packed size of one entry on disk and on the wire: `u32` timestamp + `u8` level.
pub const ENTRY_SIZE: usize = 5;

/// Highest valid battery percentage.
pub const MAX_LEVEL: u8 = 100;

/// One recorded battery sample. Immutable once stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Monotonic uptime in seconds at the moment of recording.
    pub timestamp: u32,
    /// Charge level, 0..=100.
    pub level: u8,
}

impl HistoryEntry {
    /// Build an entry, clamping the level into `0..=100`.
    pub fn new(timestamp: u32, level: u8) -> Self {
        Self {
            timestamp,
            level: level.min(MAX_LEVEL),
        }
    }

    pub fn to_bytes(self) -> [u8; ENTRY_SIZE] {
        let mut out = [0u8; ENTRY_SIZE];
        out[..4].copy_from_slice(&self.timestamp.to_le_bytes());
        out[4] = self.level;
        out
    }

    pub fn from_bytes(bytes: [u8; ENTRY_SIZE]) -> Self {
        Self {
            timestamp: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            level: bytes[4],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_clamps_level() {
        assert_eq!(HistoryEntry::new(1, 250).level, 100);
        assert_eq!(HistoryEntry::new(1, 42).level, 42);
    }

    #[test]
    fn packed_layout_is_little_endian_without_padding() {
        let bytes = HistoryEntry::new(0x0102_0304, 77).to_bytes();
        assert_eq!(bytes, [0x04, 0x03, 0x02, 0x01, 77]);
        assert_eq!(HistoryEntry::from_bytes(bytes), HistoryEntry::new(0x0102_0304, 77));
    }
}
