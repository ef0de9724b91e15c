//! In-flight SyncWrite records.

use std::fmt;

use crate::core::{DocKey, Level, Requirements, SeqNo, Timeout};

/// A decoded prepare message, ready to be tracked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prepare {
    pub key: DocKey,
    pub by_seqno: SeqNo,
    pub requirements: Requirements,
}

impl Prepare {
    pub fn new(key: DocKey, by_seqno: SeqNo, requirements: Requirements) -> Self {
        Self {
            key,
            by_seqno,
            requirements,
        }
    }
}

/// A tracked prepare awaiting local satisfaction and completion.
#[derive(Clone, Debug)]
pub struct SyncWrite {
    key: DocKey,
    by_seqno: SeqNo,
    requirements: Requirements,
    completed: bool,
}

impl SyncWrite {
    pub fn new(prepare: Prepare) -> Self {
        Self {
            key: prepare.key,
            by_seqno: prepare.by_seqno,
            requirements: prepare.requirements,
            completed: false,
        }
    }

    /// Warmup reconstruction: outstanding prepares get an infinite timeout;
    /// the active replica re-negotiates timeouts after takeover.
    pub fn outstanding(key: DocKey, by_seqno: SeqNo, level: Level) -> Self {
        Self {
            key,
            by_seqno,
            requirements: Requirements::new(level, Timeout::Infinite),
            completed: false,
        }
    }

    pub fn key(&self) -> &DocKey {
        &self.key
    }

    pub fn by_seqno(&self) -> SeqNo {
        self.by_seqno
    }

    pub fn requirements(&self) -> Requirements {
        self.requirements
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Set-once completion marker. Returns false if already completed.
    pub fn mark_completed(&mut self) -> bool {
        if self.completed {
            return false;
        }
        self.completed = true;
        true
    }
}

impl fmt::Display for SyncWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SyncWrite{{key:{} seqno:{} reqs:{} completed:{}}}",
            self.key.tagged(),
            self.by_seqno,
            self.requirements,
            self.completed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CollectionId;

    #[test]
    fn completion_is_set_once() {
        let key = DocKey::new(CollectionId::DEFAULT, "k1");
        let mut write = SyncWrite::new(Prepare::new(
            key,
            SeqNo::new(3),
            Requirements::new(Level::Majority, Timeout::Millis(30_000)),
        ));
        assert!(!write.is_completed());
        assert!(write.mark_completed());
        assert!(!write.mark_completed());
        assert!(write.is_completed());
    }

    #[test]
    fn outstanding_prepares_get_infinite_timeout() {
        let key = DocKey::new(CollectionId::DEFAULT, "k1");
        let write = SyncWrite::outstanding(key, SeqNo::new(7), Level::PersistToMajority);
        assert_eq!(write.requirements().timeout, Timeout::Infinite);
        assert_eq!(write.requirements().level, Level::PersistToMajority);
    }
}
