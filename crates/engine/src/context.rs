//! Execution context passed to every public engine operation

use chrono::{DateTime, Utc};
use hedgepool_core::{BlockHeight, Principal};

/// Who is calling, at which chain height, at what wall-clock time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub caller: Principal,
    pub height: BlockHeight,
    /// Reference clock for oracle freshness checks
    pub now: DateTime<Utc>,
}

impl ExecutionContext {
    pub fn new(caller: impl Into<Principal>, height: BlockHeight) -> Self {
        Self::at(caller, height, Utc::now())
    }

    pub fn at(caller: impl Into<Principal>, height: BlockHeight, now: DateTime<Utc>) -> Self {
        Self {
            caller: caller.into(),
            height,
            now,
        }
    }
}
