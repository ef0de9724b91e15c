//! Core domain types.
//!
//! Module hierarchy follows type dependency order:
//! - ids: PartitionId
//! - seqno: SeqNo, monotonic guards
//! - key: DocKey, CollectionId
//! - durability: Level, Timeout, Requirements
//! - snapshot: snapshot boundaries and marker flags
//! - limits: normative defaults

pub mod durability;
pub mod ids;
pub mod key;
pub mod limits;
pub mod seqno;
pub mod snapshot;

pub use durability::{Level, Requirements, Timeout};
pub use ids::PartitionId;
pub use key::{CollectionId, DocKey, KeyError, TaggedKey};
pub use limits::Limits;
pub use seqno::{AtomicMonotonic, Monotonic, MonotonicViolation, SeqNo};
pub use snapshot::{MarkerFlags, SnapshotEnd, SnapshotMarker, SnapshotType};
