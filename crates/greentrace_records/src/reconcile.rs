//! # Reconciliation
//!
//! Merges provisional (event) and authoritative (contract) records into one
//! set with a single record per identity key.
//!
//! Event records are inserted first, contract records second, so a contract
//! record replaces an event record with the same key whichever order the
//! inputs arrived in. Within one source the duplicate with the greater
//! [`precedence`] wins, so the result does not depend on input order. The
//! output is sorted newest first, then by id, then by key.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::record::{Record, Source, Status};

/// Merges the two record sets.
///
/// # Arguments
///
/// * `event_records` - Provisional records, re-tagged [`Source::Event`]
/// * `contract_records` - Authoritative records, re-tagged [`Source::Contract`]
///
/// # Returns
///
/// One record per identity key, newest first.
#[must_use]
pub fn merge(event_records: &[Record], contract_records: &[Record]) -> Vec<Record> {
    let mut by_key: HashMap<&str, Record> =
        HashMap::with_capacity(event_records.len() + contract_records.len());

    for (records, source) in [(event_records, Source::Event), (contract_records, Source::Contract)] {
        for record in records {
            let key = record.identity_key.as_str();
            let replace = match by_key.get(key) {
                Some(existing) if existing.source == source => precedence(record) > precedence(existing),
                _ => true,
            };
            if replace {
                let mut owned = record.clone();
                owned.source = source;
                by_key.insert(key, owned);
            }
        }
    }

    let mut merged: Vec<Record> = by_key.into_values().collect();
    merged.sort_by(display_order);
    merged
}

/// Ranks same-source duplicates: later `created_at`, then further status,
/// then later review, then title.
fn precedence(record: &Record) -> (u64, Status, Option<u64>, &str) {
    (record.created_at, record.status, record.audited_at, record.title.as_str())
}

/// Newest first, then ascending id, then key.
#[must_use]
pub fn display_order(a: &Record, b: &Record) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
        .then_with(|| a.identity_key.cmp(&b.identity_key))
}
