//! Identity atoms: partition ids.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Partition (vbucket) identifier: the unit of sharding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionId(u16);

impl PartitionId {
    pub fn new(id: u16) -> Self {
        Self(id)
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vb:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::PartitionId;

    #[test]
    fn display_uses_vb_prefix() {
        assert_eq!(PartitionId::new(12).to_string(), "vb:12");
    }
}
