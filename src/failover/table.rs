//! Per-partition failover log.
//!
//! An ordered list of `{uuid, seqno}` branch points, newest first. Seqnos
//! never decrease from tail to head. The table detects history changes
//! caused by node failures: a reconnecting client presents its last-known
//! branch and the table answers whether it must rewind, and to where.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::SeqNo;

use super::rollback::{self, RollbackDecision, RollbackRequest};

/// One branch point: the uuid identifies the history that began at
/// `by_seqno`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverEntry {
    #[serde(rename = "id")]
    pub uuid: u64,
    #[serde(rename = "seq")]
    pub by_seqno: u64,
}

impl fmt::Display for FailoverEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{uuid:{:#x} seq:{}}}", self.uuid, self.by_seqno)
    }
}

/// On-disk shape of the failover log. Bit-exact wire compatibility: entries
/// are newest-first, each `{"id": <u64>, "seq": <u64>}`.
#[derive(Serialize, Deserialize)]
struct FailoverLogDoc {
    failover_entries: Vec<FailoverEntry>,
}

#[derive(Debug, Error)]
pub enum FailoverError {
    #[error("failover table is empty")]
    Empty,

    #[error("failover log parse failed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("replacement failover log is empty")]
    EmptyReplacement,

    #[error("replacement failover log out of order at index {index}")]
    UnorderedReplacement { index: usize },
}

#[derive(Debug)]
struct TableInner {
    /// Newest entry at the front.
    entries: VecDeque<FailoverEntry>,
    erroneous_erased: u64,
    cached_json: String,
}

/// Bounded failover log with an interior lock; shared between stream
/// handlers.
#[derive(Debug)]
pub struct FailoverTable {
    max_entries: usize,
    /// Head uuid, readable without the table lock.
    latest_uuid: AtomicU64,
    inner: Mutex<TableInner>,
}

impl FailoverTable {
    /// Fresh table seeded with a new branch at `high_seqno`.
    pub fn new(max_entries: usize, high_seqno: SeqNo) -> Self {
        let entry = FailoverEntry {
            uuid: generate_uuid(),
            by_seqno: high_seqno.get(),
        };
        let mut inner = TableInner {
            entries: VecDeque::from([entry]),
            erroneous_erased: 0,
            cached_json: String::new(),
        };
        inner.refresh_cache();
        Self {
            max_entries,
            latest_uuid: AtomicU64::new(entry.uuid),
            inner: Mutex::new(inner),
        }
    }

    /// Restores a table from its persisted JSON, dropping entries that
    /// describe a future beyond `high_seqno` (a crash can leave the log
    /// ahead of the data). An emptied table is reseeded.
    pub fn from_json(json: &str, max_entries: usize, high_seqno: SeqNo) -> Result<Self, FailoverError> {
        let doc: FailoverLogDoc = serde_json::from_str(json)?;
        let mut entries: VecDeque<FailoverEntry> = doc.failover_entries.into();
        let erased = sanitize(&mut entries, high_seqno);
        if erased > 0 {
            tracing::warn!(
                erased,
                high_seqno = %high_seqno,
                "dropped erroneous failover entries at load"
            );
        }
        if entries.is_empty() {
            entries.push_front(FailoverEntry {
                uuid: generate_uuid(),
                by_seqno: high_seqno.get(),
            });
        }
        while entries.len() > max_entries {
            entries.pop_back();
        }

        let latest = entries.front().expect("table reseeded above").uuid;
        let mut inner = TableInner {
            entries,
            erroneous_erased: erased,
            cached_json: String::new(),
        };
        inner.refresh_cache();
        Ok(Self {
            max_entries,
            latest_uuid: AtomicU64::new(latest),
            inner: Mutex::new(inner),
        })
    }

    pub fn latest_entry(&self) -> Result<FailoverEntry, FailoverError> {
        self.lock()
            .entries
            .front()
            .copied()
            .ok_or(FailoverError::Empty)
    }

    /// Cached head uuid; usable from stat paths without taking the lock.
    pub fn latest_uuid(&self) -> u64 {
        self.latest_uuid.load(Ordering::Acquire)
    }

    /// Starts a new branch at `high_seqno`. A repeat call with the head's
    /// seqno is a no-op; entries above `high_seqno` describe a future that
    /// did not happen and are truncated first.
    pub fn create_entry(&self, high_seqno: SeqNo) {
        let mut inner = self.lock();
        if inner
            .entries
            .front()
            .is_some_and(|head| head.by_seqno == high_seqno.get())
        {
            return;
        }

        while inner
            .entries
            .front()
            .is_some_and(|head| head.by_seqno > high_seqno.get())
        {
            inner.entries.pop_front();
        }
        inner.entries.push_front(FailoverEntry {
            uuid: generate_uuid(),
            by_seqno: high_seqno.get(),
        });
        while inner.entries.len() > self.max_entries {
            inner.entries.pop_back();
        }
        self.finish_mutation(&mut inner);
    }

    /// Withdraws the newest entry (a provisional branch that never took).
    pub fn remove_latest_entry(&self) {
        let mut inner = self.lock();
        inner.entries.pop_front();
        self.finish_mutation(&mut inner);
    }

    /// Highest seqno observed under the branch `uuid`: the seqno of the
    /// next-newer entry. `None` when the uuid is unknown or is the newest
    /// branch (whose end is still moving).
    pub fn last_seqno_for_uuid(&self, uuid: u64) -> Option<u64> {
        let inner = self.lock();
        let index = inner.entries.iter().position(|entry| entry.uuid == uuid)?;
        if index == 0 {
            return None;
        }
        Some(inner.entries[index - 1].by_seqno)
    }

    pub fn needs_rollback(&self, request: &RollbackRequest) -> RollbackDecision {
        let inner = self.lock();
        rollback::evaluate(&inner.entries, request)
    }

    /// Drops entries above `seqno` after a completed rollback. The table is
    /// never left empty: a rollback below every branch point reseeds.
    pub fn prune_entries(&self, seqno: SeqNo) {
        let mut inner = self.lock();
        while inner
            .entries
            .front()
            .is_some_and(|head| head.by_seqno > seqno.get())
        {
            inner.entries.pop_front();
        }
        if inner.entries.is_empty() {
            inner.entries.push_front(FailoverEntry {
                uuid: generate_uuid(),
                by_seqno: seqno.get(),
            });
        }
        self.finish_mutation(&mut inner);
    }

    /// Current entries, newest first, for a stream-request response.
    pub fn failover_log(&self) -> Vec<FailoverEntry> {
        self.lock().entries.iter().copied().collect()
    }

    /// Wholesale replacement from a remote failover log (newest first,
    /// seqnos non-increasing).
    pub fn replace_failover_log(&self, entries: Vec<FailoverEntry>) -> Result<(), FailoverError> {
        if entries.is_empty() {
            return Err(FailoverError::EmptyReplacement);
        }
        for (index, pair) in entries.windows(2).enumerate() {
            if pair[1].by_seqno > pair[0].by_seqno {
                return Err(FailoverError::UnorderedReplacement { index: index + 1 });
            }
        }

        let mut replacement: VecDeque<FailoverEntry> = entries.into();
        while replacement.len() > self.max_entries {
            replacement.pop_back();
        }

        let mut inner = self.lock();
        inner.entries = replacement;
        self.finish_mutation(&mut inner);
        Ok(())
    }

    /// Persisted JSON form; cached and refreshed on every mutation.
    pub fn to_json(&self) -> String {
        self.lock().cached_json.clone()
    }

    pub fn num_entries(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn num_erroneous_entries_erased(&self) -> u64 {
        self.lock().erroneous_erased
    }

    fn finish_mutation(&self, inner: &mut TableInner) {
        inner.refresh_cache();
        let latest = inner.entries.front().map_or(0, |entry| entry.uuid);
        self.latest_uuid.store(latest, Ordering::Release);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TableInner> {
        self.inner.lock().expect("failover table lock poisoned")
    }
}

impl TableInner {
    fn refresh_cache(&mut self) {
        let doc = FailoverLogDoc {
            failover_entries: self.entries.iter().copied().collect(),
        };
        self.cached_json = serde_json::to_string(&doc).expect("failover log serializes");
    }
}

/// Removes entries that cannot be valid: seqnos beyond the partition's high
/// seqno, and entries breaking the non-increasing head-to-tail order.
/// Returns how many were erased.
fn sanitize(entries: &mut VecDeque<FailoverEntry>, high_seqno: SeqNo) -> u64 {
    let mut erased = 0u64;
    let mut kept: VecDeque<FailoverEntry> = VecDeque::with_capacity(entries.len());
    let mut previous: Option<u64> = None;
    for entry in entries.drain(..) {
        let beyond_high = entry.by_seqno > high_seqno.get();
        let out_of_order = previous.is_some_and(|prev| entry.by_seqno > prev);
        if beyond_high || out_of_order {
            erased += 1;
            continue;
        }
        previous = Some(entry.by_seqno);
        kept.push_back(entry);
    }
    *entries = kept;
    erased
}

fn generate_uuid() -> u64 {
    rand::random::<u64>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_table_is_seeded() {
        let table = FailoverTable::new(25, SeqNo::new(42));
        let head = table.latest_entry().expect("seeded");
        assert_eq!(head.by_seqno, 42);
        assert_eq!(table.latest_uuid(), head.uuid);
        assert_eq!(table.num_entries(), 1);
    }

    #[test]
    fn create_entry_is_idempotent_at_head_seqno() {
        let table = FailoverTable::new(25, SeqNo::new(10));
        let before = table.latest_entry().expect("head");
        table.create_entry(SeqNo::new(10));
        let after = table.latest_entry().expect("head");
        assert_eq!(before, after);
    }

    #[test]
    fn create_entry_truncates_future_branches() {
        let table = FailoverTable::new(25, SeqNo::ZERO);
        table.create_entry(SeqNo::new(50));
        table.create_entry(SeqNo::new(100));
        assert_eq!(table.num_entries(), 3);

        // A takeover at seqno 60: the branch at 100 described a future
        // that did not happen.
        table.create_entry(SeqNo::new(60));
        let log = table.failover_log();
        assert_eq!(log[0].by_seqno, 60);
        assert_eq!(log[1].by_seqno, 50);
        assert_eq!(log[2].by_seqno, 0);
        assert_eq!(table.latest_uuid(), log[0].uuid);
    }

    #[test]
    fn capacity_drops_oldest_entries() {
        let table = FailoverTable::new(3, SeqNo::ZERO);
        for seqno in [10u64, 20, 30, 40] {
            table.create_entry(SeqNo::new(seqno));
        }
        let log = table.failover_log();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].by_seqno, 40);
        assert_eq!(log[2].by_seqno, 20);
    }

    #[test]
    fn last_seqno_for_uuid_returns_the_branch_end() {
        let table = FailoverTable::new(25, SeqNo::ZERO);
        let oldest = table.latest_entry().expect("head").uuid;
        table.create_entry(SeqNo::new(50));
        let middle = table.latest_entry().expect("head").uuid;
        table.create_entry(SeqNo::new(100));
        let newest = table.latest_entry().expect("head").uuid;

        assert_eq!(table.last_seqno_for_uuid(oldest), Some(50));
        assert_eq!(table.last_seqno_for_uuid(middle), Some(100));
        assert_eq!(table.last_seqno_for_uuid(newest), None);
        assert_eq!(table.last_seqno_for_uuid(0xdead_beef), None);
    }

    #[test]
    fn json_round_trip_preserves_entries() {
        let table = FailoverTable::new(25, SeqNo::ZERO);
        table.create_entry(SeqNo::new(50));
        table.create_entry(SeqNo::new(100));

        let json = table.to_json();
        let restored =
            FailoverTable::from_json(&json, 25, SeqNo::new(100)).expect("restore");
        assert_eq!(restored.failover_log(), table.failover_log());
        assert_eq!(restored.num_erroneous_entries_erased(), 0);
    }

    #[test]
    fn json_uses_the_wire_field_names() {
        let table = FailoverTable::new(25, SeqNo::new(42));
        let head = table.latest_entry().expect("head");
        let json = table.to_json();
        let expected = format!(
            "{{\"failover_entries\":[{{\"id\":{},\"seq\":42}}]}}",
            head.uuid
        );
        assert_eq!(json, expected);
    }

    #[test]
    fn large_uuids_survive_the_json_round_trip() {
        let json = r#"{"failover_entries":[{"id":12345678901234567890,"seq":42}]}"#;
        let table = FailoverTable::from_json(json, 25, SeqNo::new(100)).expect("parse");
        let head = table.latest_entry().expect("head");
        assert_eq!(head.uuid, 12_345_678_901_234_567_890);
        assert_eq!(head.by_seqno, 42);
    }

    #[test]
    fn load_sanitizes_entries_beyond_high_seqno() {
        let json = r#"{"failover_entries":[
            {"id":7,"seq":900},
            {"id":5,"seq":100},
            {"id":3,"seq":50}
        ]}"#;
        let table = FailoverTable::from_json(json, 25, SeqNo::new(100)).expect("parse");
        assert_eq!(table.num_erroneous_entries_erased(), 1);
        let log = table.failover_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].by_seqno, 100);
    }

    #[test]
    fn load_reseeds_when_everything_is_erroneous() {
        let json = r#"{"failover_entries":[{"id":7,"seq":900}]}"#;
        let table = FailoverTable::from_json(json, 25, SeqNo::new(10)).expect("parse");
        assert_eq!(table.num_erroneous_entries_erased(), 1);
        let head = table.latest_entry().expect("reseeded");
        assert_eq!(head.by_seqno, 10);
    }

    #[test]
    fn prune_entries_never_leaves_the_table_empty() {
        let table = FailoverTable::new(25, SeqNo::ZERO);
        table.create_entry(SeqNo::new(50));
        table.create_entry(SeqNo::new(100));

        table.prune_entries(SeqNo::new(60));
        let log = table.failover_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].by_seqno, 50);

        table.prune_entries(SeqNo::new(10));
        let head = table.latest_entry().expect("reseeded");
        assert_eq!(head.by_seqno, 10);
    }

    #[test]
    fn replace_failover_log_validates_ordering() {
        let table = FailoverTable::new(25, SeqNo::ZERO);
        let err = table.replace_failover_log(Vec::new()).unwrap_err();
        assert!(matches!(err, FailoverError::EmptyReplacement));

        let err = table
            .replace_failover_log(vec![
                FailoverEntry { uuid: 1, by_seqno: 10 },
                FailoverEntry { uuid: 2, by_seqno: 90 },
            ])
            .unwrap_err();
        assert!(matches!(err, FailoverError::UnorderedReplacement { index: 1 }));

        table
            .replace_failover_log(vec![
                FailoverEntry { uuid: 9, by_seqno: 90 },
                FailoverEntry { uuid: 1, by_seqno: 10 },
            ])
            .expect("valid replacement");
        assert_eq!(table.latest_uuid(), 9);
        assert_eq!(table.num_entries(), 2);
    }
}
