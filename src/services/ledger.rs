//! History ledger - append-only, newest-first record of closed sessions
//!
//! Growth is unbounded; nothing is evicted for the lifetime of the process.

use crate::domain::types::HistoryRecord;
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct HistoryLedger {
    records: VecDeque<HistoryRecord>,
}

impl HistoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record at the head
    pub fn append(&mut self, record: HistoryRecord) {
        self.records.push_front(record);
    }

    /// All records, most recent first
    pub fn all(&self) -> impl ExactSizeIterator<Item = &HistoryRecord> + '_ {
        self.records.iter()
    }

    pub fn latest(&self) -> Option<&HistoryRecord> {
        self.records.front()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum of all recorded charges
    pub fn revenue(&self) -> f64 {
        self.records.iter().map(HistoryRecord::cost).sum()
    }
}
