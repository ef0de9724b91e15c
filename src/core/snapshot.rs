//! Snapshot boundaries received from the active replica.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::seqno::SeqNo;

/// How a snapshot was produced on the active node.
///
/// Memory snapshots preserve per-key ordering and carry every prepare. Disk
/// snapshots (backfills) may have deduplicated prepares away, which relaxes
/// several of the monitor's checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotType {
    Memory,
    Disk,
}

impl SnapshotType {
    pub fn is_disk(self) -> bool {
        matches!(self, SnapshotType::Disk)
    }
}

impl fmt::Display for SnapshotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotType::Memory => f.write_str("memory"),
            SnapshotType::Disk => f.write_str("disk"),
        }
    }
}

/// A snapshot boundary not yet fully honoured by the monitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SnapshotEnd {
    pub seqno: SeqNo,
    pub snapshot_type: SnapshotType,
}

impl fmt::Display for SnapshotEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.snapshot_type, self.seqno)
    }
}

/// Flag bits carried on a snapshot marker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MarkerFlags(u32);

impl MarkerFlags {
    pub const MEMORY: MarkerFlags = MarkerFlags(0x01);
    pub const DISK: MarkerFlags = MarkerFlags(0x02);
    pub const CHECKPOINT: MarkerFlags = MarkerFlags(0x04);
    pub const ACK: MarkerFlags = MarkerFlags(0x08);

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: MarkerFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: MarkerFlags) -> MarkerFlags {
        MarkerFlags(self.0 | other.0)
    }

    pub fn snapshot_type(self) -> SnapshotType {
        if self.contains(MarkerFlags::DISK) {
            SnapshotType::Disk
        } else {
            SnapshotType::Memory
        }
    }
}

/// Decoded snapshot-marker message: delimits `[start, end]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SnapshotMarker {
    pub start: SeqNo,
    pub end: SeqNo,
    pub flags: MarkerFlags,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disk_flag_selects_snapshot_type() {
        let memory = MarkerFlags::MEMORY.union(MarkerFlags::CHECKPOINT);
        assert_eq!(memory.snapshot_type(), SnapshotType::Memory);

        let disk = MarkerFlags::DISK.union(MarkerFlags::ACK);
        assert_eq!(disk.snapshot_type(), SnapshotType::Disk);
        assert!(disk.contains(MarkerFlags::ACK));
        assert!(!disk.contains(MarkerFlags::CHECKPOINT));
    }
}
