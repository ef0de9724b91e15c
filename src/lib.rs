#![forbid(unsafe_code)]

pub mod config;
pub mod core;
pub mod error;
pub mod failover;
pub mod monitor;
pub mod partition;
pub mod telemetry;

pub use error::{Error, Transience};
pub type Result<T> = std::result::Result<T, Error>;

// Re-export core types at crate root for convenience
pub use crate::core::{
    AtomicMonotonic, CollectionId, DocKey, KeyError, Level, Limits, MarkerFlags, Monotonic,
    MonotonicViolation, PartitionId, Requirements, SeqNo, SnapshotEnd, SnapshotMarker,
    SnapshotType, Timeout,
};
pub use crate::failover::{
    FailoverEntry, FailoverError, FailoverTable, RollbackDecision, RollbackRequest,
};
pub use crate::monitor::{
    ChannelAckSink, MonitorContext, MonitorError, MonitorStats, OutstandingPrepare,
    PassiveDurabilityMonitor, Prepare, Resolution, SeqnoAck, SeqnoAckSink, SyncWrite,
};
pub use crate::partition::{Partition, WarmupState};
