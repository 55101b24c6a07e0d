//! Bounded fault history, most recent first

use heapless::Deque;

use super::fault::FaultCode;

/// Number of records kept
pub const HISTORY_LEN: usize = 16;

/// One history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FaultRecord {
    /// Fault that was raised
    pub code: FaultCode,
    /// Time the supervisor recorded it
    pub timestamp_ms: u32,
}

/// Ring of the most recent fault onsets
#[derive(Debug, Clone, Default)]
pub struct FaultHistory {
    records: Deque<FaultRecord, HISTORY_LEN>,
}

impl FaultHistory {
    /// Create an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fault, dropping the oldest entry when full
    pub fn push(&mut self, code: FaultCode, timestamp_ms: u32) {
        if self.records.is_full() {
            self.records.pop_back();
        }
        // Cannot fail: a slot was just freed
        let _ = self.records.push_front(FaultRecord { code, timestamp_ms });
    }

    /// Records, most recent first
    pub fn iter(&self) -> impl Iterator<Item = &FaultRecord> {
        self.records.iter()
    }

    /// Most recent record
    pub fn latest(&self) -> Option<&FaultRecord> {
        self.records.front()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
