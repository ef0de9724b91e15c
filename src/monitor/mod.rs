//! Replica-side durability monitoring.

pub mod ack;
pub mod error;
pub mod passive;
pub mod sync_write;
pub mod tracked;

pub use ack::{ChannelAckSink, SeqnoAck, SeqnoAckLatch, SeqnoAckSink};
pub use error::MonitorError;
pub use passive::{
    MonitorContext, MonitorStats, OutstandingPrepare, PassiveDurabilityMonitor, Resolution,
};
pub use sync_write::{Prepare, SyncWrite};
pub use tracked::{Cursor, TrackedWrites};
