//! Sequential journal reader for audit and replay

use crate::error::JournalError;
use crate::record::JournalRecord;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

pub struct JournalReader {
    path: PathBuf,
}

impl JournalReader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Read all records in file order. A missing file reads as empty.
    pub fn read_all(&self) -> Result<Vec<JournalRecord>, JournalError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: JournalRecord = serde_json::from_str(&line).map_err(|e| {
                JournalError::InvalidFile(format!("line {}: {}", idx + 1, e))
            })?;
            records.push(record);
        }

        Ok(records)
    }

    /// Get the last record (for prev_hash)
    pub fn last_record(&self) -> Result<Option<JournalRecord>, JournalError> {
        Ok(self.read_all()?.pop())
    }

    pub fn count(&self) -> Result<usize, JournalError> {
        Ok(self.read_all()?.len())
    }
}
