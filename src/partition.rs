//! Per-partition façade over the durability monitor and failover log.
//!
//! The replication input path, the flusher, and stat collectors all talk to
//! a [`Partition`]; there are no process-wide singletons behind it. The
//! partition owns the snapshot reception state the monitor consults and the
//! persisted-seqno observer the flusher advances.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::Result;
use crate::core::{
    AtomicMonotonic, DocKey, Limits, MarkerFlags, PartitionId, SeqNo, SnapshotMarker,
};
use crate::failover::{FailoverEntry, FailoverTable, RollbackDecision, RollbackRequest};
use crate::monitor::{
    MonitorContext, MonitorStats, OutstandingPrepare, PassiveDurabilityMonitor, Prepare,
    Resolution, SeqnoAckSink,
};

/// Post-restart state handed back by the storage layer.
#[derive(Clone, Debug, Default)]
pub struct WarmupState {
    pub high_prepared_seqno: SeqNo,
    pub high_completed_seqno: SeqNo,
    pub persisted_seqno: SeqNo,
    pub outstanding_prepares: Vec<OutstandingPrepare>,
    pub failover_json: Option<String>,
}

pub struct Partition {
    id: PartitionId,
    persisted: Arc<AtomicMonotonic>,
    receiving_disk_snapshot: Arc<AtomicBool>,
    /// End seqno of the snapshot currently being received; zero when none.
    pending_snapshot_end: AtomicU64,
    monitor: PassiveDurabilityMonitor,
    failover: FailoverTable,
}

impl Partition {
    pub fn new(id: PartitionId, limits: &Limits, ack_sink: Arc<dyn SeqnoAckSink>) -> Self {
        let persisted = Arc::new(AtomicMonotonic::new(SeqNo::ZERO));
        let receiving_disk_snapshot = Arc::new(AtomicBool::new(false));
        let monitor = PassiveDurabilityMonitor::new(MonitorContext {
            partition: id,
            persisted: persisted.clone(),
            receiving_disk_snapshot: receiving_disk_snapshot.clone(),
            ack_sink,
        });
        Self {
            id,
            persisted,
            receiving_disk_snapshot,
            pending_snapshot_end: AtomicU64::new(0),
            monitor,
            failover: FailoverTable::new(limits.failover_table_capacity, SeqNo::ZERO),
        }
    }

    /// Reconstructs a partition after restart from storage-supplied state.
    pub fn warmup(
        id: PartitionId,
        limits: &Limits,
        ack_sink: Arc<dyn SeqnoAckSink>,
        state: WarmupState,
    ) -> Result<Self> {
        let persisted = Arc::new(AtomicMonotonic::new(state.persisted_seqno));
        let receiving_disk_snapshot = Arc::new(AtomicBool::new(false));
        let monitor = PassiveDurabilityMonitor::with_outstanding(
            MonitorContext {
                partition: id,
                persisted: persisted.clone(),
                receiving_disk_snapshot: receiving_disk_snapshot.clone(),
                ack_sink,
            },
            state.high_prepared_seqno,
            state.high_completed_seqno,
            state.outstanding_prepares,
        )?;
        let failover = match &state.failover_json {
            Some(json) => {
                FailoverTable::from_json(json, limits.failover_table_capacity, state.persisted_seqno)?
            }
            None => FailoverTable::new(limits.failover_table_capacity, state.persisted_seqno),
        };
        tracing::info!(
            partition = %id,
            persisted = %state.persisted_seqno,
            hps = %state.high_prepared_seqno,
            hcs = %state.high_completed_seqno,
            "partition warmed up"
        );
        Ok(Self {
            id,
            persisted,
            receiving_disk_snapshot,
            pending_snapshot_end: AtomicU64::new(0),
            monitor,
            failover,
        })
    }

    pub fn id(&self) -> PartitionId {
        self.id
    }

    pub fn monitor(&self) -> &PassiveDurabilityMonitor {
        &self.monitor
    }

    pub fn failover_table(&self) -> &FailoverTable {
        &self.failover
    }

    pub fn persisted_seqno(&self) -> SeqNo {
        self.persisted.load()
    }

    pub fn is_receiving_disk_snapshot(&self) -> bool {
        self.receiving_disk_snapshot.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> MonitorStats {
        self.monitor.stats()
    }

    /// A snapshot marker opens a new snapshot: record its type and remember
    /// the boundary so the arriving items can close it.
    pub fn snapshot_marker(&self, marker: SnapshotMarker) {
        self.receiving_disk_snapshot.store(
            marker.flags.contains(MarkerFlags::DISK),
            Ordering::Release,
        );
        self.pending_snapshot_end
            .store(marker.end.get(), Ordering::Release);
    }

    /// A plain (non-sync) mutation; only relevant as a snapshot-end carrier.
    pub fn mutation(&self, by_seqno: SeqNo) -> Result<()> {
        self.note_item(by_seqno)
    }

    /// A prepare message. `overwriting_prepare_seqno` names the prior
    /// prepare for the same key a disk snapshot is superseding.
    pub fn prepare(&self, prepare: Prepare, overwriting_prepare_seqno: Option<SeqNo>) -> Result<()> {
        let by_seqno = prepare.by_seqno;
        self.monitor
            .add_sync_write(prepare, overwriting_prepare_seqno)?;
        self.note_item(by_seqno)
    }

    pub fn commit(&self, key: &DocKey, prepare_seqno: SeqNo, commit_seqno: SeqNo) -> Result<()> {
        self.monitor
            .complete_sync_write(key, Resolution::Commit, Some(prepare_seqno))?;
        self.note_item(commit_seqno)
    }

    pub fn abort(&self, key: &DocKey, prepare_seqno: SeqNo, abort_seqno: SeqNo) -> Result<()> {
        self.monitor
            .complete_sync_write(key, Resolution::Abort, Some(prepare_seqno))?;
        self.note_item(abort_seqno)
    }

    /// Stream-side notification that the open snapshot's range is exhausted
    /// even though no item carries the boundary seqno (disk-snapshot
    /// deduplication can swallow the last items).
    pub fn snapshot_end_reached(&self, seqno: SeqNo) -> Result<()> {
        self.pending_snapshot_end.store(0, Ordering::Release);
        self.monitor.notify_snapshot_end_received(seqno)?;
        Ok(())
    }

    /// Flusher callback after a batch reached disk.
    pub fn persisted_up_to(&self, seqno: SeqNo) -> Result<()> {
        self.persisted.store_max(seqno);
        self.monitor.notify_local_persistence()?;
        Ok(())
    }

    pub fn create_failover_entry(&self, high_seqno: SeqNo) {
        self.failover.create_entry(high_seqno);
    }

    pub fn failover_log(&self) -> Vec<FailoverEntry> {
        self.failover.failover_log()
    }

    pub fn needs_rollback(&self, request: &RollbackRequest) -> RollbackDecision {
        self.failover.needs_rollback(request)
    }

    fn note_item(&self, by_seqno: SeqNo) -> Result<()> {
        let pending = self.pending_snapshot_end.load(Ordering::Acquire);
        if pending != 0 && by_seqno.get() == pending {
            self.pending_snapshot_end.store(0, Ordering::Release);
            self.monitor.notify_snapshot_end_received(by_seqno)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Partition")
            .field("id", &self.id)
            .field("persisted", &self.persisted.load())
            .field("receiving_disk_snapshot", &self.is_receiving_disk_snapshot())
            .field("stats", &self.stats())
            .finish()
    }
}
