//! What this VEN has already reported and published.

use std::collections::{HashMap, VecDeque};

use openadr_types::OutpointKey;

use crate::client::ReportReceipt;

/// Receipts of completed reports, keyed by report ID, and the successor
/// each spent event output was replaced by.
///
/// Both maps hold at most `capacity` entries; the oldest insertion is
/// forgotten first.
#[derive(Debug)]
pub(crate) struct ReportHistory {
    capacity: usize,
    receipts: HashMap<String, ReportReceipt>,
    receipt_order: VecDeque<String>,
    successors: HashMap<OutpointKey, OutpointKey>,
    successor_order: VecDeque<OutpointKey>,
}

impl ReportHistory {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            receipts: HashMap::new(),
            receipt_order: VecDeque::new(),
            successors: HashMap::new(),
            successor_order: VecDeque::new(),
        }
    }

    pub(crate) fn receipt(&self, report_id: &str) -> Option<&ReportReceipt> {
        self.receipts.get(report_id)
    }

    pub(crate) fn record_receipt(&mut self, receipt: ReportReceipt) {
        let id = receipt.report_id.clone();
        if self.receipts.insert(id.clone(), receipt).is_none() {
            self.receipt_order.push_back(id);
        }
        while self.receipt_order.len() > self.capacity {
            if let Some(oldest) = self.receipt_order.pop_front() {
                self.receipts.remove(&oldest);
            }
        }
    }

    /// Follows published successors from `key` to the newest known output
    /// of the same event.
    pub(crate) fn latest(&self, key: OutpointKey) -> OutpointKey {
        let mut current = key;
        // Bounded walk; a chain never revisits an outpoint.
        for _ in 0..self.successors.len() {
            match self.successors.get(&current) {
                Some(next) => current = *next,
                None => break,
            }
        }
        current
    }

    pub(crate) fn record_successor(&mut self, spent: OutpointKey, successor: OutpointKey) {
        if self.successors.insert(spent, successor).is_none() {
            self.successor_order.push_back(spent);
        }
        while self.successor_order.len() > self.capacity {
            if let Some(oldest) = self.successor_order.pop_front() {
                self.successors.remove(&oldest);
            }
        }
    }
}
