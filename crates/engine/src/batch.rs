//! Cursor arithmetic shared by the settlement and distribution batches

use hedgepool_core::PolicyId;
use std::ops::Range;

/// Index range a batch call may visit: at most `max_count` entries of a
/// list of `len`, starting at `start`
pub(crate) fn window(len: usize, start: usize, max_count: usize) -> Range<usize> {
    let begin = start.min(len);
    let end = begin.saturating_add(max_count).min(len);
    begin..end
}

/// A policy whose processing failed inside a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub policy_id: PolicyId,
    pub error: String,
}
