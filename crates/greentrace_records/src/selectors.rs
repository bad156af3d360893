//! Derived views over a record set. Every selector uses the displayed status.

use std::collections::BTreeMap;

use crate::record::{Record, Status};

/// Number of records per displayed status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatusCounts {
    /// Awaiting review.
    pub pending: usize,
    /// Approved, no NFT yet.
    pub approved: usize,
    /// Rejected.
    pub rejected: usize,
    /// NFT minted and still existing.
    pub minted: usize,
    /// NFT burned in an exchange.
    pub exchanged: usize,
    /// All records.
    pub total: usize,
}

impl StatusCounts {
    /// Count for one status.
    #[must_use]
    pub const fn get(&self, status: Status) -> usize {
        match status {
            Status::Pending => self.pending,
            Status::Approved => self.approved,
            Status::Rejected => self.rejected,
            Status::Minted => self.minted,
            Status::Exchanged => self.exchanged,
        }
    }
}

/// Counts records per displayed status.
#[must_use]
pub fn status_counts(records: &[Record]) -> StatusCounts {
    let mut counts = StatusCounts {
        total: records.len(),
        ..StatusCounts::default()
    };
    for record in records {
        match record.display_status() {
            Status::Pending => counts.pending += 1,
            Status::Approved => counts.approved += 1,
            Status::Rejected => counts.rejected += 1,
            Status::Minted => counts.minted += 1,
            Status::Exchanged => counts.exchanged += 1,
        }
    }
    counts
}

/// Groups records by displayed status, keeping their order. Every status has an entry.
#[must_use]
pub fn partition_by_status(records: &[Record]) -> BTreeMap<Status, Vec<Record>> {
    let mut groups: BTreeMap<Status, Vec<Record>> =
        Status::ALL.iter().map(|status| (*status, Vec::new())).collect();
    for record in records {
        groups.entry(record.display_status()).or_default().push(record.clone());
    }
    groups
}

/// Records still awaiting review.
#[must_use]
pub fn pending(records: &[Record]) -> Vec<Record> {
    records
        .iter()
        .filter(|record| record.display_status() == Status::Pending)
        .cloned()
        .collect()
}

/// Records that have been reviewed.
#[must_use]
pub fn completed(records: &[Record]) -> Vec<Record> {
    records
        .iter()
        .filter(|record| record.display_status() != Status::Pending)
        .cloned()
        .collect()
}
