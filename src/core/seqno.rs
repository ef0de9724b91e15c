//! Sequence numbers and monotonic guards.
//!
//! Every watermark in the monitor is a labelled [`Monotonic`] cell: an
//! assignment that would move the value backwards is a programmer error and
//! surfaces as [`MonotonicViolation`] naming the offending counter.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Partition sequence number. Zero means "nothing yet".
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeqNo(u64);

impl SeqNo {
    pub const ZERO: SeqNo = SeqNo(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for SeqNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeqNo({})", self.0)
    }
}

impl fmt::Display for SeqNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<SeqNo> for u64 {
    fn from(value: SeqNo) -> u64 {
        value.0
    }
}

impl From<u64> for SeqNo {
    fn from(value: u64) -> SeqNo {
        SeqNo(value)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("monotonic violation on {label}: current {current}, attempted {attempted}")]
pub struct MonotonicViolation {
    pub label: String,
    pub current: u64,
    pub attempted: u64,
}

/// Labelled monotonically non-decreasing cell.
///
/// The label names the owning counter (e.g. `pdm(vb:12).high_prepared_seqno`)
/// so a violation is diagnosable without a debugger.
#[derive(Debug, Clone)]
pub struct Monotonic<T> {
    label: String,
    value: T,
}

impl<T> Monotonic<T>
where
    T: Copy + Ord + Into<u64>,
{
    pub fn with_label(label: impl Into<String>, initial: T) -> Self {
        Self {
            label: label.into(),
            value: initial,
        }
    }

    pub fn get(&self) -> T {
        self.value
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Strictly increasing assignment.
    pub fn try_assign(&mut self, next: T) -> Result<(), MonotonicViolation> {
        if next <= self.value {
            return Err(self.violation(next));
        }
        self.value = next;
        Ok(())
    }

    /// Non-decreasing assignment: equal values are a no-op.
    pub fn assign_at_least(&mut self, next: T) -> Result<(), MonotonicViolation> {
        if next < self.value {
            return Err(self.violation(next));
        }
        self.value = next;
        Ok(())
    }

    /// Unguarded store. Warmup-only: reconstructing state from storage is the
    /// one place a watermark may be written without the monotonic check.
    pub fn reset(&mut self, value: T) {
        self.value = value;
    }

    fn violation(&self, attempted: T) -> MonotonicViolation {
        MonotonicViolation {
            label: self.label.clone(),
            current: self.value.into(),
            attempted: attempted.into(),
        }
    }
}

/// Lock-free monotonic seqno, shared between the flusher and the monitor.
///
/// A reader may observe a newer value than an earlier reader, never an older
/// one.
#[derive(Debug, Default)]
pub struct AtomicMonotonic(AtomicU64);

impl AtomicMonotonic {
    pub fn new(initial: SeqNo) -> Self {
        Self(AtomicU64::new(initial.get()))
    }

    pub fn load(&self) -> SeqNo {
        SeqNo(self.0.load(Ordering::Acquire))
    }

    /// Raises the value to `seqno` if it is higher; returns the value that
    /// was current before the store.
    pub fn store_max(&self, seqno: SeqNo) -> SeqNo {
        SeqNo(self.0.fetch_max(seqno.get(), Ordering::AcqRel))
    }
}
