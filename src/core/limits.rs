//! Safety limits (normative defaults).

use serde::{Deserialize, Serialize};

/// Values are intentionally explicit about their units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum failover-log branches kept per partition.
    pub failover_table_capacity: usize,
    /// Advisory ceiling on in-flight tracked prepares; exceeding it is
    /// logged, not rejected (the active replica owns admission control).
    pub max_tracked_writes: usize,
    /// Batch hint for warmup reconstruction of outstanding prepares.
    pub warmup_prepare_batch: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            failover_table_capacity: 25,
            max_tracked_writes: 10_000,
            warmup_prepare_batch: 1_024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Limits;

    #[test]
    fn limits_defaults() {
        let limits = Limits::default();
        assert_eq!(limits.failover_table_capacity, 25);
        assert_eq!(limits.max_tracked_writes, 10_000);
        assert_eq!(limits.warmup_prepare_batch, 1_024);
    }
}
