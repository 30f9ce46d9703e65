//! Duplicate detection (pre-pass). Grounded on `aggregate.rs`'s
//! `BTreeMap`-keyed grouping pattern: group by a rounded key, report groups
//! of size >= 2. The underlying entries remain eligible for matching — the
//! engine still assigns one per group, the rest stay unmatched and are
//! explained by the discrepancy.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::model::{BankEntry, Direction, LedgerEntry};

/// A group of two or more entries sharing the same (rounded amount,
/// direction, normalized date) key.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub indexes: Vec<usize>,
}

fn round_to_dollar(amount_cents: i64) -> i64 {
    amount_cents.abs() / 100
}

/// Group ledger entries by (rounded amount, direction, normalized date);
/// `normalized_dates[i]` must correspond to `ledger[i]`.
pub fn detect_duplicate_ledger(ledger: &[LedgerEntry], normalized_dates: &[NaiveDate]) -> Vec<DuplicateGroup> {
    let mut groups: BTreeMap<(i64, Direction, NaiveDate), Vec<usize>> = BTreeMap::new();
    for (idx, entry) in ledger.iter().enumerate() {
        let key = (round_to_dollar(entry.amount_cents), entry.direction, normalized_dates[idx]);
        groups.entry(key).or_default().push(idx);
    }
    groups
        .into_values()
        .filter(|idxs| idxs.len() >= 2)
        .map(|indexes| DuplicateGroup { indexes })
        .collect()
}

/// Group bank entries by (rounded amount, date).
pub fn detect_duplicate_bank(bank: &[BankEntry]) -> Vec<DuplicateGroup> {
    let mut groups: BTreeMap<(i64, NaiveDate), Vec<usize>> = BTreeMap::new();
    for (idx, entry) in bank.iter().enumerate() {
        let key = (round_to_dollar(entry.amount_cents), entry.date);
        groups.entry(key).or_default().push(idx);
    }
    groups
        .into_values()
        .filter(|idxs| idxs.len() >= 2)
        .map(|indexes| DuplicateGroup { indexes })
        .collect()
}
