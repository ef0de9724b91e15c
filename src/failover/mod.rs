//! Failover log and rollback decisions.

pub mod rollback;
pub mod table;

pub use rollback::{RollbackDecision, RollbackRequest};
pub use table::{FailoverEntry, FailoverError, FailoverTable};
