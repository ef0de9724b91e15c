#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use syncpoint::monitor::MonitorContext;
use syncpoint::{
    AtomicMonotonic, ChannelAckSink, CollectionId, DocKey, Level, Limits, MarkerFlags, Partition,
    PartitionId, PassiveDurabilityMonitor, Prepare, Requirements, SeqNo, SeqnoAck, SnapshotMarker,
    Timeout,
};

pub fn key(body: &str) -> DocKey {
    DocKey::new(CollectionId::DEFAULT, body)
}

pub fn prepare(body: &str, seqno: u64, level: Level) -> Prepare {
    Prepare::new(
        key(body),
        SeqNo::new(seqno),
        Requirements::new(level, Timeout::Millis(30_000)),
    )
}

pub fn prepare_infinite(body: &str, seqno: u64, level: Level) -> Prepare {
    Prepare::new(key(body), SeqNo::new(seqno), Requirements::new(level, Timeout::Infinite))
}

pub fn memory_marker(start: u64, end: u64) -> SnapshotMarker {
    SnapshotMarker {
        start: SeqNo::new(start),
        end: SeqNo::new(end),
        flags: MarkerFlags::MEMORY,
    }
}

pub fn disk_marker(start: u64, end: u64) -> SnapshotMarker {
    SnapshotMarker {
        start: SeqNo::new(start),
        end: SeqNo::new(end),
        flags: MarkerFlags::DISK,
    }
}

/// A monitor wired to observable persistence, snapshot state, and acks.
pub struct MonitorHarness {
    pub monitor: PassiveDurabilityMonitor,
    pub persisted: Arc<AtomicMonotonic>,
    pub disk_snapshot: Arc<AtomicBool>,
    pub acks: crossbeam::channel::Receiver<SeqnoAck>,
}

impl MonitorHarness {
    pub fn new(partition: u16) -> Self {
        let (sink, acks) = ChannelAckSink::unbounded();
        let persisted = Arc::new(AtomicMonotonic::new(SeqNo::ZERO));
        let disk_snapshot = Arc::new(AtomicBool::new(false));
        let monitor = PassiveDurabilityMonitor::new(MonitorContext {
            partition: PartitionId::new(partition),
            persisted: persisted.clone(),
            receiving_disk_snapshot: disk_snapshot.clone(),
            ack_sink: Arc::new(sink),
        });
        Self {
            monitor,
            persisted,
            disk_snapshot,
            acks,
        }
    }

    pub fn set_disk_snapshot(&self, receiving: bool) {
        self.disk_snapshot
            .store(receiving, std::sync::atomic::Ordering::Release);
    }

    pub fn persist_up_to(&self, seqno: u64) {
        self.persisted.store_max(SeqNo::new(seqno));
    }

    pub fn drain_acks(&self) -> Vec<SeqNo> {
        self.acks
            .try_iter()
            .map(|ack| ack.prepared_seqno)
            .collect()
    }
}

/// A partition with its ack receiver.
pub struct PartitionHarness {
    pub partition: Partition,
    pub acks: crossbeam::channel::Receiver<SeqnoAck>,
}

impl PartitionHarness {
    pub fn new(id: u16) -> Self {
        let (sink, acks) = ChannelAckSink::unbounded();
        let partition = Partition::new(PartitionId::new(id), &Limits::default(), Arc::new(sink));
        Self { partition, acks }
    }

    pub fn drain_acks(&self) -> Vec<SeqNo> {
        self.acks
            .try_iter()
            .map(|ack| ack.prepared_seqno)
            .collect()
    }
}
