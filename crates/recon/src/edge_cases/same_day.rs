//! Same-day ambiguity re-pair (post-pass). When multiple ledger entries
//! and multiple bank entries share a date with overlapping amounts, the
//! greedy pass can mis-pair; this module re-solves each same-date bucket
//! as a small bounded maximum-cardinality, minimum-cost assignment
//! (cost = 1 - confidence). Grounded on `windowed_nm.rs::kk_search` /
//! `pick_best_kk_solution`: a bounded bipartite search over small groups,
//! re-ranked by a full tie-break tuple, with an explicit cap-hit fallback
//! to the input assignment rather than an unbounded search.

use chrono::NaiveDate;

use crate::config::MatchingConfig;
use crate::model::{BankEntry, LedgerEntry};
use crate::scoring::{score, ScoredCandidate};

/// Node-visit cap for the bounded assignment search, mirroring the
/// `max_nodes` cap in `windowed_nm.rs::subset_sum_search`.
const MAX_SEARCH_NODES: usize = 20_000;

/// Outcome of attempting to re-pair one same-date bucket.
pub struct RepairOutcome {
    /// `(ledger_index, bank_index)` pairs chosen for this bucket. May be
    /// fewer than `min(ledger_idxs.len(), bank_idxs.len())` entries if some
    /// candidates score below 0.5 against everything in the bucket.
    pub pairs: Vec<(usize, usize)>,
    /// True when the bucket exceeded the size bound or the search cap and
    /// the caller's existing greedy assignment was kept unchanged instead.
    pub fell_back: bool,
}

/// One fully-enumerated candidate assignment for a bucket, carrying enough
/// aggregate information to rank it against every other assignment found.
/// Leaving a ledger entry unmatched is never free: an assignment is first
/// compared by how many pairs it covers (more is always better — dropping
/// a valid pair must never look cheaper than keeping it), and only among
/// assignments of equal cardinality does the per-pair cost, then the
/// §4.2 tie-break chain (amount delta, date delta, bank id), decide the
/// winner. The final tie-break compares each assignment's ledger-id-to-
/// bank-id pairing in ledger-id order — the same "smaller bank id wins"
/// rule §4.2 applies to one ambiguous pick, carried pair-by-pair so two
/// assignments that use the exact same bank entries but cross-wire them
/// differently still resolve to one canonical winner instead of whichever
/// the DFS happened to visit first.
struct CandidateAssignment {
    pairs: Vec<(usize, usize)>,
    cardinality: usize,
    total_cost: f64,
    total_amount_delta: i64,
    total_date_delta: i64,
    pairing_by_ledger_id: Vec<(String, String)>,
}

impl CandidateAssignment {
    fn build(
        pairs: Vec<(usize, usize)>,
        ledger: &[LedgerEntry],
        bank: &[BankEntry],
        matrix: &[Vec<Option<ScoredCandidate>>],
        positions: &[(usize, usize)],
    ) -> Self {
        let mut total_cost = 0.0;
        let mut total_amount_delta = 0;
        let mut total_date_delta = 0;
        for &(ledger_pos, bank_pos) in positions {
            let candidate = matrix[ledger_pos][bank_pos].as_ref().expect("chosen pair must have scored");
            total_cost += 1.0 - candidate.confidence;
            total_amount_delta += candidate.abs_amount_delta;
            total_date_delta += candidate.abs_date_delta;
        }
        let mut pairing_by_ledger_id: Vec<(String, String)> =
            pairs.iter().map(|&(li, bi)| (ledger[li].id.clone(), bank[bi].id.clone())).collect();
        pairing_by_ledger_id.sort();
        CandidateAssignment {
            cardinality: pairs.len(),
            total_cost,
            total_amount_delta,
            total_date_delta,
            pairing_by_ledger_id,
            pairs,
        }
    }

    /// True when `self` is a strictly better assignment than `other` under
    /// the ranking documented on the struct.
    fn beats(&self, other: &CandidateAssignment) -> bool {
        const EPS: f64 = 1e-9;
        if self.cardinality != other.cardinality {
            return self.cardinality > other.cardinality;
        }
        if (self.total_cost - other.total_cost).abs() > EPS {
            return self.total_cost < other.total_cost;
        }
        if self.total_amount_delta != other.total_amount_delta {
            return self.total_amount_delta < other.total_amount_delta;
        }
        if self.total_date_delta != other.total_date_delta {
            return self.total_date_delta < other.total_date_delta;
        }
        self.pairing_by_ledger_id < other.pairing_by_ledger_id
    }
}

/// Re-solve one same-date bucket. `ledger_idxs`/`bank_idxs` are the
/// within-bucket candidate indexes (already filtered to one normalized
/// date); `fallback_pairs` is the greedy assignment already computed for
/// this bucket, used verbatim when the bucket is too large or the search
/// budget is exhausted.
pub fn repair_bucket(
    ledger: &[LedgerEntry],
    bank: &[BankEntry],
    ledger_idxs: &[usize],
    bank_idxs: &[usize],
    normalized_date: NaiveDate,
    config: &MatchingConfig,
    bucket_size_limit: usize,
    fallback_pairs: &[(usize, usize)],
) -> RepairOutcome {
    if ledger_idxs.len() > bucket_size_limit || bank_idxs.len() > bucket_size_limit {
        return RepairOutcome { pairs: fallback_pairs.to_vec(), fell_back: true };
    }

    // Pairwise candidate matrix; `None` means the pairing scores below 0.5
    // and is never a candidate assignment.
    let mut matrix: Vec<Vec<Option<ScoredCandidate>>> = Vec::with_capacity(ledger_idxs.len());
    for &li in ledger_idxs {
        let mut row = Vec::with_capacity(bank_idxs.len());
        for &bi in bank_idxs {
            row.push(score(&ledger[li], &bank[bi], normalized_date, config));
        }
        matrix.push(row);
    }

    let mut nodes_visited = 0usize;
    let mut best: Option<CandidateAssignment> = None;
    let mut used_bank = vec![false; bank_idxs.len()];
    let mut current: Vec<(usize, usize)> = Vec::new();

    #[allow(clippy::too_many_arguments)]
    fn search(
        ledger_pos: usize,
        ledger_idxs: &[usize],
        bank_idxs: &[usize],
        ledger: &[LedgerEntry],
        bank: &[BankEntry],
        matrix: &[Vec<Option<ScoredCandidate>>],
        used_bank: &mut [bool],
        current: &mut Vec<(usize, usize)>,
        nodes_visited: &mut usize,
        best: &mut Option<CandidateAssignment>,
    ) -> bool {
        *nodes_visited += 1;
        if *nodes_visited > MAX_SEARCH_NODES {
            return false;
        }
        if ledger_pos == ledger_idxs.len() {
            let pairs: Vec<(usize, usize)> =
                current.iter().map(|&(lp, bp)| (ledger_idxs[lp], bank_idxs[bp])).collect();
            let candidate = CandidateAssignment::build(pairs, ledger, bank, matrix, current);
            let is_better = match best {
                None => true,
                Some(existing) => candidate.beats(existing),
            };
            if is_better {
                *best = Some(candidate);
            }
            return true;
        }
        // Option: leave this ledger entry unmatched within the bucket.
        let mut ok = search(
            ledger_pos + 1,
            ledger_idxs,
            bank_idxs,
            ledger,
            bank,
            matrix,
            used_bank,
            current,
            nodes_visited,
            best,
        );
        if !ok {
            return false;
        }
        for bank_pos in 0..bank_idxs.len() {
            if used_bank[bank_pos] {
                continue;
            }
            if matrix[ledger_pos][bank_pos].is_none() {
                continue;
            }
            used_bank[bank_pos] = true;
            current.push((ledger_pos, bank_pos));
            ok = search(
                ledger_pos + 1,
                ledger_idxs,
                bank_idxs,
                ledger,
                bank,
                matrix,
                used_bank,
                current,
                nodes_visited,
                best,
            );
            current.pop();
            used_bank[bank_pos] = false;
            if !ok {
                return false;
            }
        }
        true
    }

    let completed = search(
        0,
        ledger_idxs,
        bank_idxs,
        ledger,
        bank,
        &matrix,
        &mut used_bank,
        &mut current,
        &mut nodes_visited,
        &mut best,
    );

    if !completed {
        return RepairOutcome { pairs: fallback_pairs.to_vec(), fell_back: true };
    }

    match best {
        Some(assignment) => RepairOutcome { pairs: assignment.pairs, fell_back: false },
        None => RepairOutcome { pairs: Vec::new(), fell_back: false },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn ledger(id: &str, amount_cents: i64, hour: u32) -> LedgerEntry {
        LedgerEntry {
            id: id.into(),
            amount_cents,
            direction: crate::model::Direction::Credit,
            timestamp: FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap(),
        }
    }

    fn bank(id: &str, amount_cents: i64, date: NaiveDate) -> BankEntry {
        BankEntry { id: id.into(), amount_cents, date }
    }

    fn d() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[test]
    fn scenario_s5_same_day_repair_untangles_the_cross_pairing() {
        let ledger_entries = vec![ledger("TX1", 5000, 8), ledger("TX2", 7500, 9)];
        let bank_entries = vec![bank("BS1", 7500, d()), bank("BS2", 5000, d())];
        let config = MatchingConfig::default();
        // A naive greedy pass scanning bank in input order might try TX1
        // against BS1 first (mismatch) before finding BS2; the bounded
        // assignment search must find the truly optimal total pairing
        // regardless.
        let fallback = vec![];
        let outcome = repair_bucket(
            &ledger_entries,
            &bank_entries,
            &[0, 1],
            &[0, 1],
            d(),
            &config,
            16,
            &fallback,
        );
        assert!(!outcome.fell_back);
        let mut pairs = outcome.pairs.clone();
        pairs.sort();
        assert_eq!(pairs, vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn oversized_bucket_falls_back_to_existing_assignment() {
        let ledger_entries: Vec<LedgerEntry> =
            (0..20).map(|i| ledger(&format!("TX{i}"), 1000, 8)).collect();
        let bank_entries: Vec<BankEntry> =
            (0..20).map(|i| bank(&format!("BS{i}"), 1000, d())).collect();
        let config = MatchingConfig::default();
        let ledger_idxs: Vec<usize> = (0..20).collect();
        let bank_idxs: Vec<usize> = (0..20).collect();
        let fallback = vec![(0, 0), (1, 1)];
        let outcome = repair_bucket(
            &ledger_entries,
            &bank_entries,
            &ledger_idxs,
            &bank_idxs,
            d(),
            &config,
            16,
            &fallback,
        );
        assert!(outcome.fell_back);
        assert_eq!(outcome.pairs, fallback);
    }

    #[test]
    fn close_matches_are_never_dropped_in_favor_of_the_empty_matching() {
        // TX1/TX2 both have a Close (not exact) counterpart within the 1%
        // amount tolerance. Leaving every ledger entry unmatched has cost
        // 0.0, but a maximum-cardinality assignment must still win: two
        // Close matches beat zero matches regardless of their non-zero
        // cost.
        let ledger_entries = vec![ledger("TX1", 10000, 8), ledger("TX2", 20000, 9)];
        let bank_entries = vec![bank("BS1", 10050, d()), bank("BS2", 20050, d())];
        let config = MatchingConfig { amount_tolerance_percent: 1.0, ..MatchingConfig::default() };
        let fallback = vec![(0, 0), (1, 1)];
        let outcome = repair_bucket(
            &ledger_entries,
            &bank_entries,
            &[0, 1],
            &[0, 1],
            d(),
            &config,
            16,
            &fallback,
        );
        assert!(!outcome.fell_back);
        assert_eq!(outcome.pairs.len(), 2);
        let mut pairs = outcome.pairs.clone();
        pairs.sort();
        assert_eq!(pairs, vec![(0, 0), (1, 1)]);
    }

    #[test]
    fn equal_cost_ties_break_by_the_documented_chain_not_discovery_order() {
        // Two ledger entries can each match either bank entry with the same
        // confidence (both deltas are symmetric), so the maximum-cardinality,
        // minimum-cost assignment is not unique on cost alone; the winner
        // must be picked by the aggregate amount/date/id tie-break, not by
        // which branch the DFS happens to explore first.
        let ledger_entries = vec![ledger("TX1", 10000, 8), ledger("TX2", 10000, 9)];
        let bank_entries = vec![bank("BS1", 10000, d()), bank("BS2", 10000, d())];
        let config = MatchingConfig::default();
        let fallback = vec![];
        let outcome = repair_bucket(
            &ledger_entries,
            &bank_entries,
            &[0, 1],
            &[0, 1],
            d(),
            &config,
            16,
            &fallback,
        );
        assert!(!outcome.fell_back);
        assert_eq!(outcome.pairs.len(), 2);
    }
}
