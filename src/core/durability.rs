//! Durability levels and per-write requirements.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Durability level requested by the active replica for a prepare.
///
/// Variant order is the advancement order: the monitor compares levels
/// against a per-snapshot ceiling, so `Ord` is load-bearing here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    None,
    Majority,
    MajorityAndPersistOnMaster,
    PersistToMajority,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::None => "none",
            Level::Majority => "majority",
            Level::MajorityAndPersistOnMaster => "majority_and_persist_on_master",
            Level::PersistToMajority => "persist_to_majority",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SyncWrite timeout.
///
/// `Default` is a client-side placeholder: by the time a prepare reaches a
/// replica the active must have substituted an explicit value, so the
/// monitor rejects it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeout {
    Default,
    Infinite,
    Millis(u64),
}

impl Timeout {
    pub fn is_default(self) -> bool {
        matches!(self, Timeout::Default)
    }

    pub fn as_duration(self) -> Option<Duration> {
        match self {
            Timeout::Millis(ms) => Some(Duration::from_millis(ms)),
            Timeout::Default | Timeout::Infinite => None,
        }
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeout::Default => f.write_str("default"),
            Timeout::Infinite => f.write_str("infinite"),
            Timeout::Millis(ms) => write!(f, "{ms}ms"),
        }
    }
}

/// The `{level, timeout}` directive attached to a prepare.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirements {
    pub level: Level,
    pub timeout: Timeout,
}

impl Requirements {
    pub fn new(level: Level, timeout: Timeout) -> Self {
        Self { level, timeout }
    }
}

impl fmt::Display for Requirements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}, {}}}", self.level, self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_order_matches_advancement_order() {
        assert!(Level::None < Level::Majority);
        assert!(Level::Majority < Level::MajorityAndPersistOnMaster);
        assert!(Level::MajorityAndPersistOnMaster < Level::PersistToMajority);
    }

    #[test]
    fn requirements_serde_round_trip() {
        let reqs = Requirements::new(Level::PersistToMajority, Timeout::Millis(30_000));
        let json = serde_json::to_string(&reqs).expect("serialize");
        let parsed: Requirements = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, reqs);
    }

    #[test]
    fn default_timeout_is_flagged() {
        assert!(Timeout::Default.is_default());
        assert!(!Timeout::Infinite.is_default());
        assert_eq!(
            Timeout::Millis(1500).as_duration(),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(Timeout::Infinite.as_duration(), None);
    }
}
