//! The passive (replica-side) durability monitor.
//!
//! Tracks prepares received from the active replica, decides when each is
//! locally satisfied under its durability level, and advances the two
//! watermarks that drive seqno acks (high prepared) and prepare eviction
//! (high prepared + high completed).
//!
//! The high prepared seqno moves under these constraints:
//!
//! 1. Nothing is acked before a complete snapshot is received.
//! 2. Majority and MajorityAndPersistOnMaster prepares are satisfied as
//!    soon as their snapshot is complete.
//! 3. A PersistToMajority prepare is a durability fence: nothing behind it
//!    moves until the containing snapshot is fully persisted.
//! 4. An unpersisted *disk* snapshot blocks all advancement, because
//!    deduplication may have removed PersistToMajority prepares the monitor
//!    never saw.
//! 5. Once a disk snapshot is fully persisted, the watermark jumps to the
//!    snapshot end even if no prepare exists at that seqno.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::core::{AtomicMonotonic, DocKey, Level, PartitionId, SeqNo, SnapshotEnd, SnapshotType};

use super::ack::{SeqnoAckLatch, SeqnoAckSink};
use super::error::MonitorError;
use super::sync_write::{Prepare, SyncWrite};
use super::tracked::{Cursor, TrackedWrites};

/// Final resolution of a tracked prepare.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    Commit,
    Abort,
    /// The completion itself was deduplicated within a disk snapshot; the
    /// prepare is done but contributes to neither commit nor abort counts.
    CompletionWasDeduped,
}

impl Resolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Resolution::Commit => "commit",
            Resolution::Abort => "abort",
            Resolution::CompletionWasDeduped => "completion_was_deduped",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outstanding prepare handed back by the storage layer at warmup.
#[derive(Clone, Debug)]
pub struct OutstandingPrepare {
    pub key: DocKey,
    pub by_seqno: SeqNo,
    pub level: Level,
}

/// Everything the monitor needs from its owning partition.
#[derive(Clone)]
pub struct MonitorContext {
    pub partition: PartitionId,
    /// Monotonic lower bound maintained by the flusher.
    pub persisted: Arc<AtomicMonotonic>,
    /// Raised while the partition is receiving a disk snapshot.
    pub receiving_disk_snapshot: Arc<AtomicBool>,
    pub ack_sink: Arc<dyn SeqnoAckSink>,
}

impl MonitorContext {
    fn persisted_seqno(&self) -> SeqNo {
        self.persisted.load()
    }

    fn snapshot_type(&self) -> SnapshotType {
        if self.receiving_disk_snapshot.load(Ordering::Acquire) {
            SnapshotType::Disk
        } else {
            SnapshotType::Memory
        }
    }

    fn is_receiving_disk_snapshot(&self) -> bool {
        self.receiving_disk_snapshot.load(Ordering::Acquire)
    }
}

impl fmt::Debug for MonitorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorContext")
            .field("partition", &self.partition)
            .field("persisted", &self.persisted)
            .field("receiving_disk_snapshot", &self.receiving_disk_snapshot)
            .finish_non_exhaustive()
    }
}

/// Point-in-time counters for stat collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MonitorStats {
    pub high_prepared_seqno: SeqNo,
    pub high_completed_seqno: SeqNo,
    pub num_tracked: usize,
    pub num_accepted: u64,
    pub num_committed: u64,
    pub num_aborted: u64,
    pub highest_tracked_seqno: SeqNo,
}

impl fmt::Display for MonitorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hps:{} hcs:{} tracked:{} accepted:{} committed:{} aborted:{} highest:{}",
            self.high_prepared_seqno,
            self.high_completed_seqno,
            self.num_tracked,
            self.num_accepted,
            self.num_committed,
            self.num_aborted,
            self.highest_tracked_seqno
        )
    }
}

#[derive(Debug)]
struct State {
    partition: PartitionId,
    tracked: TrackedWrites,
    high_prepared: Cursor,
    high_completed: Cursor,
    snapshot_ends: VecDeque<SnapshotEnd>,
    total_accepted: u64,
    total_committed: u64,
    total_aborted: u64,
}

pub struct PassiveDurabilityMonitor {
    ctx: MonitorContext,
    state: RwLock<State>,
    ack: SeqnoAckLatch,
}

impl PassiveDurabilityMonitor {
    pub fn new(ctx: MonitorContext) -> Self {
        let partition = ctx.partition;
        Self {
            ack: SeqnoAckLatch::new(partition),
            state: RwLock::new(State::new(partition)),
            ctx,
        }
    }

    /// Warmup seeding of the two watermarks with nothing tracked.
    pub fn with_seqnos(ctx: MonitorContext, hps: SeqNo, hcs: SeqNo) -> Self {
        let monitor = Self::new(ctx);
        {
            let mut s = monitor.write_state();
            s.high_prepared.restore(None, hps);
            s.high_completed.restore(None, hcs);
        }
        monitor
    }

    /// Warmup reconstruction with the outstanding prepares the storage
    /// layer found. Prepares must arrive in ascending seqno order.
    ///
    /// Cursor positions land on the highest prepare at or below each seeded
    /// watermark. The completed cursor may sit mid-sequence: a prior
    /// incarnation can have completed writes that were never persisted and
    /// are therefore still tracked.
    pub fn with_outstanding(
        ctx: MonitorContext,
        hps: SeqNo,
        hcs: SeqNo,
        prepares: Vec<OutstandingPrepare>,
    ) -> Result<Self, MonitorError> {
        let monitor = Self::with_seqnos(ctx, hps, hcs);
        {
            let mut s = monitor.write_state();
            let mut hps_position = None;
            let mut hcs_position = None;
            for prepare in prepares {
                if prepare.level == Level::None {
                    return Err(MonitorError::InvalidLevel {
                        partition: s.partition,
                        key: prepare.key,
                    });
                }
                if let Some(highest) = s.tracked.highest_seqno()
                    && prepare.by_seqno <= highest
                {
                    return Err(MonitorError::NonMonotonicAppend {
                        partition: s.partition,
                        attempted: prepare.by_seqno,
                        highest,
                    });
                }
                if prepare.by_seqno <= hps {
                    hps_position = Some(prepare.by_seqno);
                }
                if prepare.by_seqno <= hcs {
                    hcs_position = Some(prepare.by_seqno);
                }
                s.tracked
                    .append(SyncWrite::outstanding(prepare.key, prepare.by_seqno, prepare.level));
            }
            s.high_prepared.restore(hps_position, hps);
            s.high_completed.restore(hcs_position, hcs);
            tracing::debug!(
                partition = %s.partition,
                tracked = s.tracked.len(),
                hps = %hps,
                hcs = %hcs,
                "monitor reconstructed from warmup"
            );
        }
        Ok(monitor)
    }

    /// Starts tracking a prepare. No watermark moves here; that waits for
    /// the snapshot end.
    pub fn add_sync_write(
        &self,
        prepare: Prepare,
        overwriting_prepare_seqno: Option<SeqNo>,
    ) -> Result<(), MonitorError> {
        let partition = self.ctx.partition;
        if prepare.requirements.level == Level::None {
            return Err(MonitorError::InvalidLevel {
                partition,
                key: prepare.key,
            });
        }
        if prepare.requirements.timeout.is_default() {
            return Err(MonitorError::InvalidTimeout {
                partition,
                key: prepare.key,
            });
        }

        let mut s = self.write_state();
        if let Some(expected) = overwriting_prepare_seqno
            && let Some(tracked_seqno) = s.tracked.find_by_key(&prepare.key).map(|w| w.by_seqno())
        {
            if tracked_seqno != expected {
                return Err(MonitorError::OverwriteSeqnoMismatch {
                    partition,
                    key: prepare.key,
                    expected,
                    tracked: tracked_seqno,
                });
            }
            s.high_completed.note_removed(tracked_seqno);
            s.high_prepared.note_removed(tracked_seqno);
            s.tracked.remove(tracked_seqno);
        }

        // Duplicate detection is linear in the tracked set, so debug only.
        #[cfg(debug_assertions)]
        if let Some(dup) = s.tracked.find_non_completed_by_key(&prepare.key) {
            return Err(MonitorError::DuplicateKey {
                partition,
                key: prepare.key,
                tracked_seqno: dup.by_seqno(),
            });
        }

        if let Some(highest) = s.tracked.highest_seqno()
            && prepare.by_seqno <= highest
        {
            return Err(MonitorError::NonMonotonicAppend {
                partition,
                attempted: prepare.by_seqno,
                highest,
            });
        }

        s.tracked.append(SyncWrite::new(prepare));
        s.total_accepted += 1;
        Ok(())
    }

    /// A snapshot boundary has been fully received. The new boundary may
    /// immediately unblock pending prepares, so advancement runs now and
    /// any new watermark is acked.
    pub fn notify_snapshot_end_received(&self, snap_end: SeqNo) -> Result<(), MonitorError> {
        {
            let mut s = self.write_state();
            if let Some(highest) = s.tracked.highest_seqno()
                && snap_end < highest
            {
                return Err(MonitorError::SnapshotEndBehindPrepares {
                    partition: s.partition,
                    snap_end,
                    highest_tracked: highest,
                });
            }
            s.snapshot_ends.push_back(SnapshotEnd {
                seqno: snap_end,
                snapshot_type: self.ctx.snapshot_type(),
            });
            let prev = s.high_prepared.seqno();
            s.update_high_prepared(self.ctx.persisted_seqno())?;
            self.ack.store(prev, s.high_prepared.seqno());
        }
        self.ack.flush(self.ctx.ack_sink.as_ref())?;
        Ok(())
    }

    /// The flusher has run: persistence may have moved the durability
    /// fence.
    pub fn notify_local_persistence(&self) -> Result<(), MonitorError> {
        {
            let mut s = self.write_state();
            let prev = s.high_prepared.seqno();
            s.update_high_prepared(self.ctx.persisted_seqno())?;
            self.ack.store(prev, s.high_prepared.seqno());
        }
        self.ack.flush(self.ctx.ack_sink.as_ref())?;
        Ok(())
    }

    /// Applies a commit or abort to the tracked prepare for `key`.
    ///
    /// During disk snapshots completions for distinct keys may arrive out
    /// of prepare order (deduplication), so the candidate is found by key
    /// scan instead of strict succession.
    pub fn complete_sync_write(
        &self,
        key: &DocKey,
        resolution: Resolution,
        prepare_seqno: Option<SeqNo>,
    ) -> Result<(), MonitorError> {
        let mut s = self.write_state();
        let partition = s.partition;

        if s.tracked.is_empty() {
            return Err(MonitorError::NothingTracked {
                partition,
                resolution,
                key: key.clone(),
            });
        }

        let enforce_ordered = !self.ctx.is_receiving_disk_snapshot();
        let candidate = if enforce_ordered {
            s.tracked.next_after(s.high_completed.position())
        } else {
            s.tracked.iter().find(|w| w.key() == key)
        };

        let Some(candidate) = candidate else {
            return Err(MonitorError::NoPrepareForCompletion {
                partition,
                resolution,
                key: key.clone(),
            });
        };

        if candidate.key() != key {
            return Err(MonitorError::CompletionKeyMismatch {
                partition,
                pending: candidate.to_string(),
                pending_seqno: candidate.by_seqno(),
                resolution,
                key: key.clone(),
            });
        }
        let candidate_seqno = candidate.by_seqno();

        if let Some(supplied) = prepare_seqno
            && supplied != candidate_seqno
        {
            return Err(MonitorError::CompletionSeqnoMismatch {
                partition,
                resolution,
                key: key.clone(),
                supplied,
                pending_seqno: candidate_seqno,
            });
        }

        // A deduped disk-backfill commit, or the late completion of a
        // prepare the watermark already passed, targets a seqno at or below
        // the completed watermark; the cursor never moves backwards for
        // them. Eviction picks the write up once it is marked.
        if candidate_seqno > s.high_completed.seqno() {
            s.high_completed.advance_to(candidate_seqno)?;
        }

        let write = s
            .tracked
            .get_mut(candidate_seqno)
            .expect("candidate resolved under the same lock");
        if !write.mark_completed() {
            return Err(MonitorError::AlreadyCompleted {
                partition,
                key: key.clone(),
                seqno: candidate_seqno,
            });
        }

        s.check_for_and_remove_prepares();

        match resolution {
            Resolution::Commit => s.total_committed += 1,
            Resolution::Abort => s.total_aborted += 1,
            Resolution::CompletionWasDeduped => {}
        }
        Ok(())
    }

    pub fn high_prepared_seqno(&self) -> SeqNo {
        self.read_state().high_prepared.seqno()
    }

    pub fn high_completed_seqno(&self) -> SeqNo {
        self.read_state().high_completed.seqno()
    }

    pub fn num_tracked(&self) -> usize {
        self.read_state().tracked.len()
    }

    pub fn num_accepted(&self) -> u64 {
        self.read_state().total_accepted
    }

    pub fn num_committed(&self) -> u64 {
        self.read_state().total_committed
    }

    pub fn num_aborted(&self) -> u64 {
        self.read_state().total_aborted
    }

    pub fn highest_tracked_seqno(&self) -> SeqNo {
        self.read_state()
            .tracked
            .highest_seqno()
            .unwrap_or(SeqNo::ZERO)
    }

    pub fn stats(&self) -> MonitorStats {
        let s = self.read_state();
        MonitorStats {
            high_prepared_seqno: s.high_prepared.seqno(),
            high_completed_seqno: s.high_completed.seqno(),
            num_tracked: s.tracked.len(),
            num_accepted: s.total_accepted,
            num_committed: s.total_committed,
            num_aborted: s.total_aborted,
            highest_tracked_seqno: s.tracked.highest_seqno().unwrap_or(SeqNo::ZERO),
        }
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().expect("monitor state lock poisoned")
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().expect("monitor state lock poisoned")
    }
}

impl fmt::Debug for PassiveDurabilityMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassiveDurabilityMonitor")
            .field("partition", &self.ctx.partition)
            .field("stats", &self.stats())
            .finish()
    }
}

impl State {
    fn new(partition: PartitionId) -> Self {
        Self {
            partition,
            tracked: TrackedWrites::new(),
            high_prepared: Cursor::new(format!("pdm({partition}).high_prepared_seqno")),
            high_completed: Cursor::new(format!("pdm({partition}).high_completed_seqno")),
            snapshot_ends: VecDeque::new(),
            total_accepted: 0,
            total_committed: 0,
            total_aborted: 0,
        }
    }

    /// Walks the snapshot-boundary queue, advancing the prepared watermark
    /// as far as the durability fence and persistence allow. `persisted` is
    /// sampled once by the caller and treated as a lower bound for every
    /// boundary evaluated in this run.
    fn update_high_prepared(&mut self, persisted: SeqNo) -> Result<(), MonitorError> {
        let prev = self.high_prepared.seqno();

        while let Some(&snap) = self.snapshot_ends.front() {
            let fully_persisted = persisted >= snap.seqno;
            let max_level = match (snap.snapshot_type, fully_persisted) {
                (_, true) => Level::PersistToMajority,
                (SnapshotType::Memory, false) => Level::MajorityAndPersistOnMaster,
                (SnapshotType::Disk, false) => Level::None,
            };

            loop {
                let Some(next) = self.tracked.next_after(self.high_prepared.position()) else {
                    break;
                };
                let seqno = next.by_seqno();
                if seqno <= self.high_prepared.seqno() {
                    // A dedup jump left the position behind this element;
                    // the watermark already covers it.
                    self.high_prepared.skip_covered(seqno);
                    continue;
                }
                if seqno > snap.seqno || next.requirements().level > max_level {
                    break;
                }
                self.high_prepared.advance_to(seqno)?;
            }

            if snap.snapshot_type.is_disk() && fully_persisted {
                // Deduplication may have removed prepares this monitor never
                // saw; once the whole snapshot is persisted they are all
                // satisfied, so the boundary itself is ack-worthy. The
                // position may lag the seqno from here on.
                self.high_prepared.raise_seqno(snap.seqno)?;
            }

            let blocked = (snap.snapshot_type.is_disk() && !fully_persisted)
                || self
                    .tracked
                    .next_after(self.high_prepared.position())
                    .is_some_and(|w| w.by_seqno() <= snap.seqno);
            if blocked {
                break;
            }
            self.snapshot_ends.pop_front();
        }

        let new = self.high_prepared.seqno();
        if new > prev {
            tracing::trace!(
                partition = %self.partition,
                from = %prev,
                to = %new,
                "high prepared seqno advanced"
            );
            self.check_for_and_remove_prepares();
        }
        Ok(())
    }

    /// Evicts completed prepares at or below both watermarks, resetting any
    /// cursor whose position is removed.
    fn check_for_and_remove_prepares(&mut self) {
        if self.tracked.is_empty() {
            return;
        }
        let fence = self.high_completed.seqno().min(self.high_prepared.seqno());
        let removable: Vec<SeqNo> = self
            .tracked
            .iter()
            .take_while(|w| w.by_seqno() <= fence)
            .filter(|w| w.is_completed())
            .map(|w| w.by_seqno())
            .collect();
        for seqno in removable {
            self.high_completed.note_removed(seqno);
            self.high_prepared.note_removed(seqno);
            self.tracked.remove(seqno);
        }
    }
}
