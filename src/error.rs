use thiserror::Error;

use crate::config::ConfigError;
use crate::failover::FailoverError;
use crate::monitor::MonitorError;

/// Whether retrying this operation may succeed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Transience {
    /// Retry will never help without changing inputs/state.
    Permanent,
    /// Retry may help (stream reset, transient contention).
    Retryable,
    /// Unknown if retry will help.
    Unknown,
}

impl Transience {
    pub fn is_retryable(self) -> bool {
        matches!(self, Transience::Retryable)
    }
}

/// Crate-level convenience error: a thin wrapper over the per-subsystem
/// errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error(transparent)]
    Failover(#[from] FailoverError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    pub fn transience(&self) -> Transience {
        match self {
            Error::Monitor(e) => e.transience(),
            Error::Failover(_) => Transience::Permanent,
            Error::Config(e) => e.transience(),
        }
    }
}
