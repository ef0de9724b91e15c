//! Durability monitor error types.
//!
//! Almost everything here is a programmer error: the replication stream has
//! handed the monitor something its invariants forbid, and the partition
//! must be marked dead. The one exception is
//! [`MonitorError::SnapshotEndBehindPrepares`], which a stream reset
//! recovers from.

use thiserror::Error;

use crate::core::{DocKey, MonotonicViolation, PartitionId, SeqNo};
use crate::error::Transience;

use super::passive::Resolution;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("{partition}: prepare for {} has durability level none", key.tagged())]
    InvalidLevel { partition: PartitionId, key: DocKey },

    #[error(
        "{partition}: prepare for {} has default timeout (active must substitute an explicit value)",
        key.tagged()
    )]
    InvalidTimeout { partition: PartitionId, key: DocKey },

    #[error(
        "{partition}: non-completed prepare for {} already tracked at seqno {tracked_seqno}",
        key.tagged()
    )]
    DuplicateKey {
        partition: PartitionId,
        key: DocKey,
        tracked_seqno: SeqNo,
    },

    #[error(
        "{partition}: overwrite of prepare for {} expected seqno {expected}, found {tracked}",
        key.tagged()
    )]
    OverwriteSeqnoMismatch {
        partition: PartitionId,
        key: DocKey,
        expected: SeqNo,
        tracked: SeqNo,
    },

    #[error("{partition}: prepare seqno {attempted} not after highest tracked {highest}")]
    NonMonotonicAppend {
        partition: PartitionId,
        attempted: SeqNo,
        highest: SeqNo,
    },

    #[error("{partition}: received {resolution} for {} but nothing is tracked", key.tagged())]
    NothingTracked {
        partition: PartitionId,
        resolution: Resolution,
        key: DocKey,
    },

    #[error(
        "{partition}: no prepare waiting for completion, received {resolution} for {}",
        key.tagged()
    )]
    NoPrepareForCompletion {
        partition: PartitionId,
        resolution: Resolution,
        key: DocKey,
    },

    #[error(
        "{partition}: pending completion is {pending} at seqno {pending_seqno}, received {resolution} for {}",
        key.tagged()
    )]
    CompletionKeyMismatch {
        partition: PartitionId,
        pending: String,
        pending_seqno: SeqNo,
        resolution: Resolution,
        key: DocKey,
    },

    #[error(
        "{partition}: {resolution} for {} carries prepare seqno {supplied}, pending prepare is at {pending_seqno}",
        key.tagged()
    )]
    CompletionSeqnoMismatch {
        partition: PartitionId,
        resolution: Resolution,
        key: DocKey,
        supplied: SeqNo,
        pending_seqno: SeqNo,
    },

    #[error("{partition}: prepare for {} at seqno {seqno} completed twice", key.tagged())]
    AlreadyCompleted {
        partition: PartitionId,
        key: DocKey,
        seqno: SeqNo,
    },

    #[error(
        "{partition}: snapshot end {snap_end} behind highest tracked prepare {highest_tracked}"
    )]
    SnapshotEndBehindPrepares {
        partition: PartitionId,
        snap_end: SeqNo,
        highest_tracked: SeqNo,
    },

    #[error(transparent)]
    Monotonic(#[from] MonotonicViolation),
}

impl MonitorError {
    pub fn transience(&self) -> Transience {
        match self {
            MonitorError::SnapshotEndBehindPrepares { .. } => Transience::Retryable,
            _ => Transience::Permanent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CollectionId;

    #[test]
    fn stream_errors_are_retryable_logic_errors_are_not() {
        let retryable = MonitorError::SnapshotEndBehindPrepares {
            partition: PartitionId::new(3),
            snap_end: SeqNo::new(5),
            highest_tracked: SeqNo::new(9),
        };
        assert_eq!(retryable.transience(), Transience::Retryable);

        let fatal = MonitorError::InvalidLevel {
            partition: PartitionId::new(3),
            key: DocKey::new(CollectionId::DEFAULT, "k"),
        };
        assert_eq!(fatal.transience(), Transience::Permanent);
    }

    #[test]
    fn messages_tag_user_data() {
        let err = MonitorError::InvalidTimeout {
            partition: PartitionId::new(7),
            key: DocKey::new(CollectionId::DEFAULT, "secret"),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("<ud>"), "{rendered}");
        assert!(rendered.contains("vb:7"), "{rendered}");
    }
}
