//! Rollback decisions for reconnecting stream clients.

use std::collections::VecDeque;
use std::fmt;

use crate::core::SeqNo;

use super::table::FailoverEntry;

/// What a reconnecting client presents from its last-known history.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RollbackRequest {
    /// Seqno the client wants to resume from.
    pub start_seqno: SeqNo,
    /// Current high seqno of this partition.
    pub cur_seqno: SeqNo,
    /// Latest branch uuid known to the client.
    pub vb_uuid: u64,
    pub snap_start_seqno: SeqNo,
    pub snap_end_seqno: SeqNo,
    /// Highest seqno purged by compaction.
    pub purge_seqno: SeqNo,
    /// Require a uuid match even when resuming from zero.
    pub strict_uuid_match: bool,
    /// Collection-filtered streams may roll back no further than the
    /// collections' own high seqno.
    pub max_collection_high_seqno: Option<SeqNo>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RollbackDecision {
    /// Resume allowed; the snapshot range is clamped so the client can
    /// continue mid-snapshot without rewinding.
    Unnecessary {
        snap_start_seqno: SeqNo,
        snap_end_seqno: SeqNo,
    },
    Required { rollback_seqno: SeqNo, reason: String },
}

impl RollbackDecision {
    pub fn needs_rollback(&self) -> bool {
        matches!(self, RollbackDecision::Required { .. })
    }

    pub fn rollback_seqno(&self) -> Option<SeqNo> {
        match self {
            RollbackDecision::Required { rollback_seqno, .. } => Some(*rollback_seqno),
            RollbackDecision::Unnecessary { .. } => None,
        }
    }
}

impl fmt::Display for RollbackDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackDecision::Unnecessary {
                snap_start_seqno,
                snap_end_seqno,
            } => write!(f, "no rollback, snapshot [{snap_start_seqno}, {snap_end_seqno}]"),
            RollbackDecision::Required {
                rollback_seqno,
                reason,
            } => write!(f, "rollback to {rollback_seqno}: {reason}"),
        }
    }
}

/// Decides rollback against the branch history, newest entry first.
pub(super) fn evaluate(entries: &VecDeque<FailoverEntry>, req: &RollbackRequest) -> RollbackDecision {
    // Starting from the very beginning never needs a rewind.
    if req.start_seqno.is_zero() && !req.strict_uuid_match {
        return RollbackDecision::Unnecessary {
            snap_start_seqno: req.snap_start_seqno,
            snap_end_seqno: req.snap_end_seqno,
        };
    }

    let Some(index) = entries.iter().position(|entry| entry.uuid == req.vb_uuid) else {
        return RollbackDecision::Required {
            rollback_seqno: SeqNo::ZERO,
            reason: format!("vb_uuid {:#x} not found in failover table", req.vb_uuid),
        };
    };

    let branch_start = SeqNo::new(entries[index].by_seqno);
    // The branch ends where the next-newer branch begins; the newest branch
    // extends to the partition's current high seqno.
    let branch_end = if index == 0 {
        req.cur_seqno
    } else {
        SeqNo::new(entries[index - 1].by_seqno)
    };

    let start_in_branch = req.start_seqno >= branch_start && req.start_seqno <= branch_end;
    let snap_in_branch =
        req.snap_start_seqno >= branch_start && req.snap_end_seqno <= branch_end;
    let above_purge = req.start_seqno >= req.purge_seqno;

    if start_in_branch && snap_in_branch && above_purge {
        let (snap_start_seqno, snap_end_seqno) =
            adjust_snapshot_range(req.start_seqno, req.snap_start_seqno, req.snap_end_seqno);
        return RollbackDecision::Unnecessary {
            snap_start_seqno,
            snap_end_seqno,
        };
    }

    let mut rollback_seqno = branch_end.min(req.snap_start_seqno);
    if let Some(limit) = req.max_collection_high_seqno {
        rollback_seqno = rollback_seqno.min(limit);
    }

    let reason = if !start_in_branch {
        format!(
            "start seqno {} outside branch [{branch_start}, {branch_end}]",
            req.start_seqno
        )
    } else if !snap_in_branch {
        format!(
            "snapshot [{}, {}] spans a branch boundary of [{branch_start}, {branch_end}]",
            req.snap_start_seqno, req.snap_end_seqno
        )
    } else {
        format!(
            "start seqno {} below purge seqno {}",
            req.start_seqno, req.purge_seqno
        )
    };

    RollbackDecision::Required {
        rollback_seqno,
        reason,
    }
}

/// Clamps the snapshot range so a client resuming mid-snapshot is not sent
/// back to the snapshot start it already passed.
fn adjust_snapshot_range(
    start_seqno: SeqNo,
    _snap_start_seqno: SeqNo,
    snap_end_seqno: SeqNo,
) -> (SeqNo, SeqNo) {
    (start_seqno, snap_end_seqno.max(start_seqno))
}
