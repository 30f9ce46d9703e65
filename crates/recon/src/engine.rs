//! Matching engine: deterministic iteration order, indexed candidate
//! search, scoring, and greedy one-to-one assignment. Grounded on
//! `windowed_nm.rs::solve_bucket`'s staged-pass shape and
//! `matcher.rs::match_fuzzy_amount_date`'s "first unused best candidate
//! wins, mark both sides used" loop, generalized from one bucket to the
//! full indexed candidate stream.

use chrono::NaiveDate;

use crate::config::MatchingConfig;
use crate::index::BankIndex;
use crate::model::{BankEntry, LedgerEntry, MatchResult};
use crate::scoring::{score, ScoreRank};

/// Output of one matching pass: which ledger indexes matched which bank
/// indexes, and which of each side remain unused. Indexes, not references,
/// so edge-case passes can mutate the assignment before the caller
/// converts everything to borrowed `MatchResult`s.
pub struct EngineOutput {
    pub matched_pairs: Vec<(usize, usize)>,
    pub unmatched_ledger: Vec<usize>,
    pub unmatched_bank: Vec<usize>,
}

/// Deterministic ledger iteration order: timestamp asc, then amount desc,
/// then identifier asc. Returns indexes into `ledger`, not a reordered copy,
/// so downstream bookkeeping can stay index-based.
pub fn ledger_iteration_order(ledger: &[LedgerEntry]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..ledger.len()).collect();
    order.sort_by(|&a, &b| {
        let ea = &ledger[a];
        let eb = &ledger[b];
        ea.timestamp
            .cmp(&eb.timestamp)
            .then_with(|| eb.amount_cents.abs().cmp(&ea.amount_cents.abs()))
            .then_with(|| ea.id.cmp(&eb.id))
    });
    order
}

/// Run the core greedy matching pass. `ledger_normalized_dates[i]` must be
/// the normalized date for `ledger[i]` (computed once by the timezone
/// edge-case pass, not recomputed here — see the "normalize once at
/// preprocessing" design note).
///
/// A cancellation hook is checked every `cancel_check_interval` ledger
/// entries; when it returns `true`, matching stops early and the remaining
/// ledger entries are reported unmatched. The orchestrator, not the
/// engine, is responsible for surfacing `Cancelled` to the caller.
pub fn run_matching(
    ledger: &[LedgerEntry],
    bank: &[BankEntry],
    ledger_normalized_dates: &[NaiveDate],
    index: &BankIndex<'_>,
    config: &MatchingConfig,
    cancel_check_interval: usize,
    mut is_cancelled: impl FnMut() -> bool,
) -> (EngineOutput, bool) {
    debug_assert_eq!(ledger.len(), ledger_normalized_dates.len());

    let order = ledger_iteration_order(ledger);
    let mut bank_used = vec![false; bank.len()];
    let mut ledger_used = vec![false; ledger.len()];
    let mut matched_pairs = Vec::new();
    let mut cancelled = false;

    for (checked, &li) in order.iter().enumerate() {
        if checked > 0 && checked % cancel_check_interval.max(1) == 0 && is_cancelled() {
            cancelled = true;
            break;
        }

        let ledger_entry = &ledger[li];
        let normalized_date = ledger_normalized_dates[li];
        let candidate_idxs = index.candidates(
            ledger_entry.amount_cents.abs(),
            normalized_date,
            config,
            &bank_used,
        );

        let mut best: Option<(usize, ScoreRank<'_>)> = None;
        for bi in candidate_idxs {
            if bank_used[bi] {
                continue;
            }
            let bank_entry = index.entry(bi);
            let Some(candidate) = score(ledger_entry, bank_entry, normalized_date, config) else {
                continue;
            };
            // score() already floors at 0.5; fuzzy-disabled runs additionally
            // require min_confidence, discarding the Possible band.
            if !config.enable_fuzzy && candidate.confidence < config.min_confidence {
                continue;
            }
            let rank = ScoreRank::new(&candidate, bank_entry.id.as_str());
            let is_better = match &best {
                None => true,
                Some((_, best_rank)) => rank.partial_cmp(best_rank) == Some(std::cmp::Ordering::Greater),
            };
            if is_better {
                best = Some((bi, rank));
            }
        }

        if let Some((bi, _)) = best {
            bank_used[bi] = true;
            ledger_used[li] = true;
            matched_pairs.push((li, bi));
        }
    }

    let unmatched_ledger: Vec<usize> = (0..ledger.len()).filter(|&i| !ledger_used[i]).collect();
    let unmatched_bank: Vec<usize> = (0..bank.len()).filter(|&i| !bank_used[i]).collect();

    (
        EngineOutput { matched_pairs, unmatched_ledger, unmatched_bank },
        cancelled,
    )
}

/// Convert an `EngineOutput`'s index pairs into borrowed `MatchResult`s,
/// re-scoring each pair (cheap — pure function, no search) to recover the
/// sub-scores for the result type.
pub fn to_match_results<'a>(
    output: &EngineOutput,
    ledger: &'a [LedgerEntry],
    bank: &'a [BankEntry],
    ledger_normalized_dates: &[NaiveDate],
    config: &MatchingConfig,
) -> Vec<MatchResult<'a>> {
    output
        .matched_pairs
        .iter()
        .filter_map(|&(li, bi)| {
            let l = &ledger[li];
            let b = &bank[bi];
            let candidate = score(l, b, ledger_normalized_dates[li], config)?;
            Some(MatchResult {
                ledger: l,
                bank: b,
                confidence: candidate.confidence,
                match_type: candidate.match_type,
                sub_scores: candidate.sub_scores,
            })
        })
        .collect()
}
