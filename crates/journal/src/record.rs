//! Journal record - one committed event with its chain links

use chrono::{DateTime, Utc};
use hedgepool_ledger::EngineEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Previous-hash value of the first record
pub const GENESIS: &str = "GENESIS";

/// A line of the audit journal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    /// Strictly increasing, starting at 1
    pub sequence: u64,
    pub prev_hash: String,
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    /// Groups the records produced by one engine operation
    pub correlation_id: Uuid,
    pub event: EngineEvent,
}
