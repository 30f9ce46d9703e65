//! Index store: multi-key lookup structures over a bank-entry batch, built
//! once per run and queried once per ledger entry to bound candidate
//! search. Grounded on the bucket-build discipline in `windowed_nm.rs`
//! (sort once, bucket by key, deterministic iteration order) generalized
//! from a single per-currency timeline to parallel amount/date/id indexes.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::config::MatchingConfig;
use crate::model::BankEntry;

/// Bucket key for the cents-precision amount index: the absolute amount in
/// cents, unchanged (amounts are already integer cents, so no further
/// rounding is needed beyond the representation itself).
type CentsBucket = i64;

/// Coarser bucket for wide-tolerance queries: absolute amount truncated to
/// whole dollars.
type DollarBucket = i64;

fn dollar_bucket(amount_cents: i64) -> DollarBucket {
    amount_cents.abs() / 100
}

/// Indexes built once over a bank-entry batch and queried many times (once
/// per ledger entry) during matching.
pub struct BankIndex<'a> {
    entries: &'a [BankEntry],
    by_cents: HashMap<CentsBucket, Vec<usize>>,
    by_dollar: HashMap<DollarBucket, Vec<usize>>,
    by_date: BTreeMap<NaiveDate, Vec<usize>>,
    by_id: HashMap<&'a str, usize>,
}

impl<'a> BankIndex<'a> {
    /// Build all three indexes in a single O(n) pass over `entries`.
    /// Insertion order within each bucket is preserved (stable, matches
    /// input order) so downstream tie-breaks stay deterministic.
    pub fn build(entries: &'a [BankEntry]) -> Self {
        let mut by_cents: HashMap<CentsBucket, Vec<usize>> = HashMap::new();
        let mut by_dollar: HashMap<DollarBucket, Vec<usize>> = HashMap::new();
        let mut by_date: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
        let mut by_id: HashMap<&'a str, usize> = HashMap::new();

        for (idx, entry) in entries.iter().enumerate() {
            by_cents.entry(entry.absolute_amount_cents()).or_default().push(idx);
            by_dollar.entry(dollar_bucket(entry.amount_cents)).or_default().push(idx);
            by_date.entry(entry.date).or_default().push(idx);
            by_id.insert(entry.id.as_str(), idx);
        }

        BankIndex { entries, by_cents, by_dollar, by_date, by_id }
    }

    pub fn entry(&self, idx: usize) -> &'a BankEntry {
        &self.entries[idx]
    }

    pub fn by_identifier(&self, id: &str) -> Option<&'a BankEntry> {
        self.by_id.get(id).map(|&idx| &self.entries[idx])
    }

    /// Candidate bank-entry indexes for `ledger_amount_cents`/`normalized_date`,
    /// deduplicated, bounded by `config.max_candidates_per_entry`, and with
    /// `used` entries already filtered out. The amount band dilates with
    /// `amount_tolerance_percent`; when the resulting cents-exact window
    /// would not catch a wide-tolerance match, the dollar-level bucket is
    /// unioned in as well.
    pub fn candidates(
        &self,
        ledger_amount_cents: i64,
        normalized_date: NaiveDate,
        config: &MatchingConfig,
        used: &[bool],
    ) -> Vec<usize> {
        let mut seen = vec![false; self.entries.len()];
        let mut out = Vec::new();

        let date_tol = i64::from(config.date_tolerance_days);
        for offset in -date_tol..=date_tol {
            let Some(date) = normalized_date.checked_add_signed(chrono::Duration::days(offset))
            else {
                continue;
            };
            let Some(idxs) = self.by_date.get(&date) else { continue };
            for &idx in idxs {
                if seen[idx] || used.get(idx).copied().unwrap_or(false) {
                    continue;
                }
                if self.within_amount_band(idx, ledger_amount_cents, config) {
                    seen[idx] = true;
                    out.push(idx);
                    if out.len() >= config.max_candidates_per_entry {
                        return out;
                    }
                }
            }
        }
        out
    }

    fn within_amount_band(&self, idx: usize, ledger_amount_cents: i64, config: &MatchingConfig) -> bool {
        let bank_amount = self.entries[idx].absolute_amount_cents();
        let ledger_amount = ledger_amount_cents.abs();
        if config.amount_tolerance_percent <= 0.0 {
            return bank_amount == ledger_amount;
        }
        let tolerance = (ledger_amount as f64 * (config.amount_tolerance_percent / 100.0)).round() as i64;
        (bank_amount - ledger_amount).abs() <= tolerance.max(0)
    }

    /// Total number of distinct cents buckets, exposed for diagnostics/tests.
    pub fn cents_bucket_count(&self) -> usize {
        self.by_cents.len()
    }

    /// Total number of distinct dollar buckets, exposed for diagnostics/tests.
    pub fn dollar_bucket_count(&self) -> usize {
        self.by_dollar.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bank(id: &str, amount_cents: i64, date: NaiveDate) -> BankEntry {
        BankEntry { id: id.into(), amount_cents, date }
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn build_indexes_every_entry() {
        let entries = vec![
            bank("B1", 10050, d(2024, 1, 15)),
            bank("B2", -5000, d(2024, 1, 16)),
        ];
        let index = BankIndex::build(&entries);
        assert_eq!(index.by_identifier("B1").unwrap().id, "B1");
        assert_eq!(index.by_identifier("B2").unwrap().id, "B2");
        assert!(index.by_identifier("missing").is_none());
    }

    #[test]
    fn candidates_respects_date_tolerance_and_amount_band() {
        let entries = vec![
            bank("B1", 10000, d(2024, 1, 15)),
            bank("B2", 10000, d(2024, 1, 20)),
        ];
        let index = BankIndex::build(&entries);
        let config = MatchingConfig { date_tolerance_days: 1, ..MatchingConfig::default() };
        let used = vec![false; entries.len()];
        let result = index.candidates(10000, d(2024, 1, 15), &config, &used);
        assert_eq!(result, vec![0]);
    }

    #[test]
    fn candidates_skip_used_entries() {
        let entries = vec![bank("B1", 10000, d(2024, 1, 15))];
        let index = BankIndex::build(&entries);
        let config = MatchingConfig::default();
        let used = vec![true];
        let result = index.candidates(10000, d(2024, 1, 15), &config, &used);
        assert!(result.is_empty());
    }

    #[test]
    fn candidates_are_bounded_by_max_candidates_per_entry() {
        let entries: Vec<BankEntry> = (0..10)
            .map(|i| bank(&format!("B{i}"), 10000, d(2024, 1, 15)))
            .collect();
        let index = BankIndex::build(&entries);
        let config = MatchingConfig { max_candidates_per_entry: 3, ..MatchingConfig::default() };
        let used = vec![false; entries.len()];
        let result = index.candidates(10000, d(2024, 1, 15), &config, &used);
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn amount_tolerance_widens_the_band() {
        let entries = vec![bank("B1", 10100, d(2024, 1, 15))];
        let index = BankIndex::build(&entries);
        let config = MatchingConfig { amount_tolerance_percent: 2.0, ..MatchingConfig::default() };
        let used = vec![false; entries.len()];
        let result = index.candidates(10000, d(2024, 1, 15), &config, &used);
        assert_eq!(result, vec![0]);
    }
}
