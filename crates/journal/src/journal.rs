//! Append-only JSONL audit journal

use crate::error::JournalError;
use crate::hash::calculate_record_hash;
use crate::reader::JournalReader;
use crate::record::{JournalRecord, GENESIS};
use chrono::Utc;
use hedgepool_ledger::EngineEvent;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Append-only, hash-chained journal of committed engine events
pub struct AuditJournal {
    path: PathBuf,
    writer: BufWriter<File>,
    last_sequence: u64,
    last_hash: String,
}

impl AuditJournal {
    /// Open (or create) the journal file and resume the chain from its
    /// last record.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let (last_sequence, last_hash) = match JournalReader::new(&path).last_record()? {
            Some(record) => (record.sequence, record.hash),
            None => (0, GENESIS.to_string()),
        };

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            last_sequence,
            last_hash,
        })
    }

    /// Append the events of one operation under a shared correlation id
    pub fn append_all(&mut self, events: &[EngineEvent]) -> Result<Vec<JournalRecord>, JournalError> {
        let correlation_id = Uuid::new_v4();
        let mut written = Vec::with_capacity(events.len());

        for event in events {
            let mut record = JournalRecord {
                sequence: self.last_sequence + 1,
                prev_hash: self.last_hash.clone(),
                hash: String::new(),
                timestamp: Utc::now(),
                correlation_id,
                event: event.clone(),
            };
            record.hash = calculate_record_hash(&record);

            let json = serde_json::to_string(&record)?;
            writeln!(self.writer, "{}", json)?;

            debug!(
                sequence = record.sequence,
                kind = record.event.kind(),
                "Journal record appended"
            );

            self.last_sequence = record.sequence;
            self.last_hash = record.hash.clone();
            written.push(record);
        }

        self.writer.flush()?;
        Ok(written)
    }

    /// Append a single event
    pub fn append(&mut self, event: EngineEvent) -> Result<JournalRecord, JournalError> {
        let mut records = self.append_all(std::slice::from_ref(&event))?;
        records
            .pop()
            .ok_or_else(|| JournalError::InvalidFile("no record written".to_string()))
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    pub fn last_hash(&self) -> &str {
        &self.last_hash
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush buffered output
    pub fn flush(&mut self) -> Result<(), JournalError> {
        self.writer.flush()?;
        Ok(())
    }
}

impl Drop for AuditJournal {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::verify_chain;
    use hedgepool_core::{Amount, BlockHeight, PolicyId};
    use tempfile::TempDir;

    fn released(id: u64) -> EngineEvent {
        EngineEvent::CollateralReleased {
            policy_id: PolicyId(id),
            amount: Amount::new(10),
        }
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");

        let mut journal = AuditJournal::open(&path).unwrap();
        journal.append(released(1)).unwrap();
        journal.append(released(2)).unwrap();
        assert_eq!(journal.last_sequence(), 2);

        let records = JournalReader::new(&path).read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].prev_hash, GENESIS);
        assert!(verify_chain(&records).is_ok());
    }

    #[test]
    fn test_resume_continues_chain() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");

        {
            let mut journal = AuditJournal::open(&path).unwrap();
            journal.append(released(1)).unwrap();
        }

        let mut journal = AuditJournal::open(&path).unwrap();
        assert_eq!(journal.last_sequence(), 1);
        let record = journal
            .append(EngineEvent::LiquidityPrepared {
                height: 144 as BlockHeight,
                required: Amount::new(1_000),
            })
            .unwrap();
        assert_eq!(record.sequence, 2);

        let records = JournalReader::new(&path).read_all().unwrap();
        assert!(verify_chain(&records).is_ok());
    }

    #[test]
    fn test_batch_shares_correlation_id() {
        let dir = TempDir::new().unwrap();
        let mut journal = AuditJournal::open(dir.path().join("j.jsonl")).unwrap();

        let records = journal.append_all(&[released(1), released(2)]).unwrap();
        assert_eq!(records[0].correlation_id, records[1].correlation_id);
        assert_eq!(records[1].prev_hash, records[0].hash);
    }
}
