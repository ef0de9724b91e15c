//! The tracked-writes container and its cursors.
//!
//! The container is a seqno-keyed ordered map rather than a list with raw
//! iterators: cursor positions are plain seqnos that can be re-resolved
//! after any removal, so a cursor can never dangle. A cursor's
//! `last_write_seqno` is always truthful even while its position is `None`
//! ("nothing yet", or "pointed-at element removed; reposition on the next
//! advancement").

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::core::{DocKey, Monotonic, MonotonicViolation, SeqNo};

use super::sync_write::SyncWrite;

/// Ordered sequence of in-flight SyncWrites, keyed by seqno.
#[derive(Debug, Default)]
pub struct TrackedWrites {
    writes: BTreeMap<SeqNo, SyncWrite>,
}

impl TrackedWrites {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn highest_seqno(&self) -> Option<SeqNo> {
        self.writes.last_key_value().map(|(&seqno, _)| seqno)
    }

    /// Appends at the tail. The caller has already validated that the seqno
    /// is strictly greater than the current highest.
    pub fn append(&mut self, write: SyncWrite) {
        self.writes.insert(write.by_seqno(), write);
    }

    pub fn get(&self, seqno: SeqNo) -> Option<&SyncWrite> {
        self.writes.get(&seqno)
    }

    pub fn get_mut(&mut self, seqno: SeqNo) -> Option<&mut SyncWrite> {
        self.writes.get_mut(&seqno)
    }

    pub fn remove(&mut self, seqno: SeqNo) -> Option<SyncWrite> {
        self.writes.remove(&seqno)
    }

    /// The element a cursor would advance to next: the head when the cursor
    /// has no position, otherwise the successor of the pointed-at seqno.
    pub fn next_after(&self, position: Option<SeqNo>) -> Option<&SyncWrite> {
        match position {
            None => self.writes.values().next(),
            Some(seqno) => self
                .writes
                .range((Bound::Excluded(seqno), Bound::Unbounded))
                .map(|(_, write)| write)
                .next(),
        }
    }

    /// First tracked write for `key`, in seqno order.
    pub fn find_by_key(&self, key: &DocKey) -> Option<&SyncWrite> {
        self.writes.values().find(|write| write.key() == key)
    }

    /// First non-completed tracked write for `key` (duplicate detection).
    pub fn find_non_completed_by_key(&self, key: &DocKey) -> Option<&SyncWrite> {
        self.writes
            .values()
            .find(|write| !write.is_completed() && write.key() == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SyncWrite> {
        self.writes.values()
    }
}

/// Logical position in the tracked sequence plus the watermark it carries.
#[derive(Debug)]
pub struct Cursor {
    position: Option<SeqNo>,
    last_write_seqno: Monotonic<SeqNo>,
}

impl Cursor {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            position: None,
            last_write_seqno: Monotonic::with_label(label, SeqNo::ZERO),
        }
    }

    pub fn seqno(&self) -> SeqNo {
        self.last_write_seqno.get()
    }

    pub fn position(&self) -> Option<SeqNo> {
        self.position
    }

    /// Moves the cursor onto a tracked element. Watermark update comes first
    /// so a monotonicity failure leaves the cursor unmoved.
    pub fn advance_to(&mut self, seqno: SeqNo) -> Result<(), MonotonicViolation> {
        self.last_write_seqno.try_assign(seqno)?;
        self.position = Some(seqno);
        Ok(())
    }

    /// Raises the watermark without touching the position. Disk-snapshot
    /// dedup may make the watermark ack-worthy at a seqno with no tracked
    /// element; the position is allowed to lag and must never be used to
    /// read the watermark.
    pub fn raise_seqno(&mut self, seqno: SeqNo) -> Result<(), MonotonicViolation> {
        self.last_write_seqno.assign_at_least(seqno)
    }

    /// Moves the position onto an element the watermark already covers.
    /// After a dedup jump the position lags the seqno; catching up over
    /// covered elements must not touch the watermark.
    pub fn skip_covered(&mut self, seqno: SeqNo) {
        debug_assert!(seqno <= self.last_write_seqno.get());
        self.position = Some(seqno);
    }

    /// Invalidates the position if it points at a removed element.
    pub fn note_removed(&mut self, seqno: SeqNo) {
        if self.position == Some(seqno) {
            self.position = None;
        }
    }

    /// Warmup-only unguarded restore of both halves.
    pub fn restore(&mut self, position: Option<SeqNo>, seqno: SeqNo) {
        self.position = position;
        self.last_write_seqno.reset(seqno);
    }
}
