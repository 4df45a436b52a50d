//! HedgePool Audit Journal
//!
//! Append-only JSONL file of committed engine events. Each record carries
//! the SHA256 of its content and of its predecessor, so truncation or
//! tampering is detectable with [`verify_chain`].

pub mod error;
pub mod hash;
pub mod journal;
pub mod reader;
pub mod record;

pub use error::JournalError;
pub use hash::{calculate_record_hash, verify_chain, ChainError};
pub use journal::AuditJournal;
pub use reader::JournalReader;
pub use record::{JournalRecord, GENESIS};
